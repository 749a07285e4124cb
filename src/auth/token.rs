//! Static bearer token authentication
//!
//! Tokens come from configuration and map to user emails. The user is
//! looked up on every request, so deleting a user or changing the
//! supervisor flag takes effect immediately.

use crate::auth::provider::Authenticator;
use crate::auth::user::UserContext;
use crate::config::TokenConfig;
use crate::error::AuthError;
use crate::store::UserStore;
use crate::util::SecretString;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Authenticator backed by a fixed token table
#[derive(Clone)]
pub struct StaticTokenAuthenticator {
    tokens: Arc<[(SecretString, String)]>,
    users: Arc<dyn UserStore>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: Vec<(SecretString, String)>, users: Arc<dyn UserStore>) -> Self {
        Self {
            tokens: tokens.into(),
            users,
        }
    }

    /// Build from the `[bootstrap]` token list
    pub fn from_config(tokens: &[TokenConfig], users: Arc<dyn UserStore>) -> Self {
        Self::new(
            tokens
                .iter()
                .map(|t| (t.token.clone(), t.email.clone()))
                .collect(),
            users,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserContext, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        if self.tokens.is_empty() {
            return Err(AuthError::NotConfigured);
        }

        let Some((_, email)) = self.tokens.iter().find(|(secret, _)| secret.matches(token)) else {
            debug!("Unknown bearer token");
            return Err(AuthError::UnknownCredentials);
        };

        match self.users.find_user_by_email(email).await {
            Ok(Some(user)) => Ok(UserContext::from(&user)),
            Ok(None) => {
                warn!(email = %email, "Token maps to an unregistered user");
                Err(AuthError::UnknownCredentials)
            }
            Err(e) => Err(AuthError::Failed(e.to_string())),
        }
    }

    fn auth_type(&self) -> &'static str {
        "Static Bearer Token"
    }
}
