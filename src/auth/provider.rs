//! Authenticator trait
//!
//! Credential verification is an external concern; the authorization core
//! only ever sees the [`UserContext`] an authenticator produces.

use crate::auth::user::UserContext;
use crate::error::AuthError;
// async_trait required for dyn-compatibility with Arc<dyn Authenticator>
use async_trait::async_trait;
use std::sync::Arc;

/// Turns a presented credential into a user context
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify a bearer token.
    ///
    /// Returns `AuthError::UnknownCredentials` for a well-formed token that
    /// matches no user, and `AuthError::InvalidToken` for a malformed one.
    async fn authenticate(&self, token: &str) -> Result<UserContext, AuthError>;

    /// Short description of the method (for logging)
    fn auth_type(&self) -> &'static str;
}

/// Shared authenticator handle
pub type SharedAuthenticator = Arc<dyn Authenticator>;

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
