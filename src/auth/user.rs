//! User records and the per-request user context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Global super-user flag; its reach inside workspaces is governed by
    /// [`SupervisorBypass`](crate::membership::SupervisorBypass)
    pub is_supervisor: bool,
    pub created_at: DateTime<Utc>,
}

/// The authenticated caller attached to a request.
///
/// Produced by an [`Authenticator`](super::Authenticator); the guard never sees credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    pub id: Uuid,
    pub email: String,
    pub is_supervisor: bool,
}

impl UserContext {
    pub fn new(id: Uuid, email: impl Into<String>, is_supervisor: bool) -> Self {
        Self {
            id,
            email: email.into(),
            is_supervisor,
        }
    }
}

impl From<&User> for UserContext {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_supervisor: user.is_supervisor,
        }
    }
}
