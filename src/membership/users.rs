//! User administration
//!
//! Deleting a user touches every workspace the user belongs to, so it runs
//! as a [`UserRemoval`](crate::store::UserRemoval) that claims all of them
//! and re-checks the admin invariant for each before committing.

use crate::auth::{User, UserContext};
use crate::error::{MembershipError, MembershipResult, StoreError};
use crate::membership::engine::store_error;
use crate::metrics::AuthzMetrics;
use crate::store::{MembershipStore, UserStore};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Attempts at deleting a user that keeps joining new workspaces
const USER_REMOVAL_ATTEMPTS: usize = 3;

fn supervisors_only(action: &str) -> MembershipError {
    MembershipError::Forbidden(format!("only supervisors can {}", action))
}

/// Registers, looks up and deletes users
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserStore>,
    memberships: Arc<dyn MembershipStore>,
    metrics: Option<Arc<AuthzMetrics>>,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserStore>, memberships: Arc<dyn MembershipStore>) -> Self {
        Self {
            users,
            memberships,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AuthzMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a user; supervisors only
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn register(
        &self,
        actor: &UserContext,
        email: &str,
        is_supervisor: bool,
    ) -> MembershipResult<User> {
        if !actor.is_supervisor {
            return Err(supervisors_only("register users"));
        }

        let email = email.trim();
        if !email.contains('@') {
            return Err(MembershipError::Invalid(format!(
                "not an email address: {}",
                email
            )));
        }

        let user = self.users.create_user(email, is_supervisor).await?;
        info!(user_id = %user.id, is_supervisor, "Registered user");
        Ok(user)
    }

    /// Make sure a supervisor with this email exists
    pub async fn ensure_supervisor(&self, email: &str) -> MembershipResult<User> {
        match self.users.find_user_by_email(email).await? {
            Some(user) if user.is_supervisor => Ok(user),
            Some(user) => {
                warn!(user_id = %user.id, "Promoting bootstrap user to supervisor");
                self.users
                    .set_supervisor(user.id, true)
                    .await?
                    .ok_or_else(|| MembershipError::UserNotFound(user.id.to_string()))
            }
            None => {
                let user = self.users.create_user(email, true).await?;
                info!(user_id = %user.id, "Created bootstrap supervisor");
                Ok(user)
            }
        }
    }

    /// A user, visible to itself and to supervisors
    pub async fn get(&self, actor: &UserContext, user_id: Uuid) -> MembershipResult<User> {
        if actor.id != user_id && !actor.is_supervisor {
            return Err(supervisors_only("view other users"));
        }
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| MembershipError::UserNotFound(user_id.to_string()))
    }

    /// Grant or revoke the supervisor flag; supervisors only
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn set_supervisor(
        &self,
        actor: &UserContext,
        user_id: Uuid,
        is_supervisor: bool,
    ) -> MembershipResult<User> {
        if !actor.is_supervisor {
            return Err(supervisors_only("change the supervisor flag"));
        }
        if actor.id == user_id && !is_supervisor {
            return Err(MembershipError::Invalid(
                "supervisors cannot revoke their own flag".to_string(),
            ));
        }

        let user = self
            .users
            .set_supervisor(user_id, is_supervisor)
            .await?
            .ok_or_else(|| MembershipError::UserNotFound(user_id.to_string()))?;
        info!(%user_id, is_supervisor, "Changed supervisor flag");
        Ok(user)
    }

    /// Delete a user with their role assignments and memberships.
    ///
    /// Refused when the user is the only admin of a workspace that still
    /// has other members. A workspace the user was alone in is left empty.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete(&self, actor: &UserContext, user_id: Uuid) -> MembershipResult<()> {
        let result = self.try_delete(actor, user_id).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_membership("delete_user", &result);
        }
        result
    }

    async fn try_delete(&self, actor: &UserContext, user_id: Uuid) -> MembershipResult<()> {
        if !actor.is_supervisor {
            return Err(supervisors_only("delete users"));
        }
        if self.users.find_user(user_id).await?.is_none() {
            return Err(MembershipError::UserNotFound(user_id.to_string()));
        }

        let mut attempt = 1;
        loop {
            let mut removal = self.memberships.begin_user_removal(user_id).await?;

            if let Some(blocked) = removal
                .headcounts()
                .await?
                .into_iter()
                .find(|h| h.role.is_admin() && h.admins <= 1 && h.members > 1)
            {
                info!(%user_id, workspace_id = %blocked.workspace_id, "Denied: user is the last admin");
                return Err(MembershipError::InvariantViolation(format!(
                    "user is the last admin of workspace {} which still has other members",
                    blocked.workspace_id
                )));
            }

            match removal.commit().await {
                Ok(()) => {
                    info!(%user_id, "Deleted user");
                    return Ok(());
                }
                Err(StoreError::Conflict(reason)) if attempt < USER_REMOVAL_ATTEMPTS => {
                    debug!(%user_id, attempt, %reason, "Retrying user removal");
                    attempt += 1;
                }
                Err(e) => return Err(store_error(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::types::{NewMember, WorkspaceRole};
    use crate::membership::{MembershipEngine, SupervisorBypass};
    use crate::store::MemoryStore;

    struct Fixture {
        users: UserDirectory,
        engine: MembershipEngine,
        store: Arc<MemoryStore>,
        root: UserContext,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let users = UserDirectory::new(store.clone(), store.clone());
        let engine = MembershipEngine::new(store.clone(), store.clone(), SupervisorBypass::default());
        let root = UserContext::from(&users.ensure_supervisor("root@example.com").await.unwrap());
        Fixture {
            users,
            engine,
            store,
            root,
        }
    }

    #[tokio::test]
    async fn test_register_requires_supervisor() {
        let f = fixture().await;
        let a = UserContext::from(&f.users.register(&f.root, "a@example.com", false).await.unwrap());

        let err = f.users.register(&a, "b@example.com", false).await.unwrap_err();
        assert!(matches!(err, MembershipError::Forbidden(_)));

        let err = f.users.register(&f.root, "A@example.com", false).await.unwrap_err();
        assert!(matches!(
            err,
            MembershipError::Store(StoreError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_supervisor_is_idempotent() {
        let f = fixture().await;
        let again = f.users.ensure_supervisor("root@example.com").await.unwrap();
        assert_eq!(again.id, f.root.id);
    }

    #[tokio::test]
    async fn test_get_user_visibility() {
        let f = fixture().await;
        let a = UserContext::from(&f.users.register(&f.root, "a@example.com", false).await.unwrap());
        let b = UserContext::from(&f.users.register(&f.root, "b@example.com", false).await.unwrap());

        assert!(f.users.get(&a, a.id).await.is_ok());
        assert!(f.users.get(&f.root, a.id).await.is_ok());
        assert!(matches!(
            f.users.get(&a, b.id).await.unwrap_err(),
            MembershipError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn test_supervisor_cannot_revoke_self() {
        let f = fixture().await;
        let err = f.users.set_supervisor(&f.root, f.root.id, false).await.unwrap_err();
        assert!(matches!(err, MembershipError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_delete_last_admin_with_members_refused() {
        let f = fixture().await;
        let a = UserContext::from(&f.users.register(&f.root, "a@example.com", false).await.unwrap());
        let b = UserContext::from(&f.users.register(&f.root, "b@example.com", false).await.unwrap());
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();
        f.engine
            .add_member(&a, w.id, NewMember::by_id(b.id, WorkspaceRole::Member))
            .await
            .unwrap();

        let err = f.users.delete(&f.root, a.id).await.unwrap_err();
        assert!(matches!(err, MembershipError::InvariantViolation(_)));
        assert!(f.store.find_user(a.id).await.unwrap().is_some());

        // b can go; a stays admin
        f.users.delete(&f.root, b.id).await.unwrap();
        assert!(f.store.membership(b.id, w.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_sole_member_leaves_empty_workspace() {
        let f = fixture().await;
        let a = UserContext::from(&f.users.register(&f.root, "a@example.com", false).await.unwrap());
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        f.users.delete(&f.root, a.id).await.unwrap();
        assert!(f.store.find_workspace(w.id).await.unwrap().is_some());
        assert!(f.store.workspaces_for_user(a.id).await.unwrap().is_empty());

        let err = f.users.delete(&f.root, a.id).await.unwrap_err();
        assert!(matches!(err, MembershipError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_requires_supervisor() {
        let f = fixture().await;
        let a = UserContext::from(&f.users.register(&f.root, "a@example.com", false).await.unwrap());
        let err = f.users.delete(&a, a.id).await.unwrap_err();
        assert!(matches!(err, MembershipError::Forbidden(_)));
    }
}
