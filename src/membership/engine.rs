//! Membership invariant engine
//!
//! Every mutating operation runs inside one [`MembershipTransaction`]: the
//! workspace is claimed, the actor's role and the admin count are read from
//! that claim, the decision is made, and the write is committed before the
//! claim is released. Two operations on the same workspace therefore never
//! decide on the same admin count, and an error or a dropped future leaves
//! nothing behind.
//!
//! Checks run in a fixed order: workspace exists, actor may perform the
//! operation, target exists, then conflict and invariant checks.

use crate::auth::{User, UserContext};
use crate::error::{MembershipError, MembershipResult, StoreError};
use crate::membership::policy::{MembershipOperation, SupervisorBypass};
use crate::membership::types::{
    MemberRef, Membership, NewMember, UserWorkspace, Workspace, WorkspaceChanges,
    WorkspaceMember, WorkspaceRole,
};
use crate::metrics::AuthzMetrics;
use crate::store::{MembershipStore, MembershipTransaction, UserStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Map a commit-time integrity failure to the caller-facing error
pub(crate) fn store_error(err: StoreError) -> MembershipError {
    match err {
        StoreError::MissingReference { entity: "user", key } => MembershipError::UserNotFound(key),
        other => other.into(),
    }
}

/// Workspace lifecycle and membership operations
#[derive(Clone)]
pub struct MembershipEngine {
    memberships: Arc<dyn MembershipStore>,
    users: Arc<dyn UserStore>,
    policy: SupervisorBypass,
    metrics: Option<Arc<AuthzMetrics>>,
}

impl MembershipEngine {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        users: Arc<dyn UserStore>,
        policy: SupervisorBypass,
    ) -> Self {
        Self {
            memberships,
            users,
            policy,
            metrics: None,
        }
    }

    /// Record operation outcomes in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<AuthzMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> &SupervisorBypass {
        &self.policy
    }

    fn observe<T>(&self, operation: &str, result: MembershipResult<T>) -> MembershipResult<T> {
        if let Some(metrics) = &self.metrics {
            metrics.record_membership(operation, &result);
        }
        result
    }

    /// Claim the workspace and load it
    async fn open(
        &self,
        workspace_id: Uuid,
    ) -> MembershipResult<(Box<dyn MembershipTransaction>, Workspace)> {
        let mut tx = self.memberships.begin(workspace_id).await?;
        let workspace = tx
            .workspace()
            .await?
            .ok_or(MembershipError::WorkspaceNotFound(workspace_id))?;
        Ok((tx, workspace))
    }

    /// Actor is an ADMIN of the workspace, or a supervisor the policy lets through
    async fn authorize_actor(
        &self,
        tx: &mut dyn MembershipTransaction,
        actor: &UserContext,
        operation: MembershipOperation,
    ) -> MembershipResult<()> {
        let role = tx.membership(actor.id).await?.map(|m| m.role);
        if role.is_some_and(|r| r.is_admin()) {
            return Ok(());
        }

        if actor.is_supervisor && self.policy.allows(operation) {
            debug!(
                actor = %actor.id,
                workspace_id = %tx.workspace_id(),
                %operation,
                "Supervisor bypass applied"
            );
            return Ok(());
        }

        info!(
            actor = %actor.id,
            workspace_id = %tx.workspace_id(),
            %operation,
            "Denied: actor is not a workspace admin"
        );
        Err(MembershipError::admins_only(operation.action()))
    }

    async fn find_target(&self, target: &MemberRef) -> MembershipResult<User> {
        let user = match target {
            MemberRef::Id { user_id } => self.users.find_user(*user_id).await?,
            MemberRef::Email { email } => self.users.find_user_by_email(email).await?,
        };
        user.ok_or_else(|| MembershipError::UserNotFound(target.to_string()))
    }

    async fn commit(tx: Box<dyn MembershipTransaction>) -> MembershipResult<()> {
        tx.commit().await.map_err(store_error)
    }

    /// Create a workspace with the actor as its only ADMIN
    #[instrument(skip(self, actor, description), fields(actor = %actor.id))]
    pub async fn create_workspace(
        &self,
        actor: &UserContext,
        name: &str,
        description: Option<&str>,
    ) -> MembershipResult<Workspace> {
        let result = self.try_create_workspace(actor, name, description).await;
        self.observe("create_workspace", result)
    }

    async fn try_create_workspace(
        &self,
        actor: &UserContext,
        name: &str,
        description: Option<&str>,
    ) -> MembershipResult<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MembershipError::Invalid(
                "workspace name must not be empty".to_string(),
            ));
        }

        let (workspace, _) = self
            .memberships
            .create_workspace(name, description, actor.id)
            .await
            .map_err(store_error)?;
        info!(workspace_id = %workspace.id, "Created workspace");
        Ok(workspace)
    }

    /// A workspace, visible to its members and to supervisors
    pub async fn get_workspace(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
    ) -> MembershipResult<Workspace> {
        let workspace = self
            .memberships
            .find_workspace(workspace_id)
            .await?
            .ok_or(MembershipError::WorkspaceNotFound(workspace_id))?;

        if actor.is_supervisor
            || self
                .memberships
                .membership(actor.id, workspace_id)
                .await?
                .is_some()
        {
            Ok(workspace)
        } else {
            Err(MembershipError::Forbidden(
                "not a member of this workspace".to_string(),
            ))
        }
    }

    /// Workspaces the actor belongs to, with the actor's role in each
    pub async fn list_my_workspaces(
        &self,
        actor: &UserContext,
    ) -> MembershipResult<Vec<UserWorkspace>> {
        Ok(self
            .memberships
            .workspaces_for_user(actor.id)
            .await?
            .into_iter()
            .map(|(workspace, membership)| UserWorkspace {
                workspace,
                role: membership.role,
            })
            .collect())
    }

    /// Every workspace; supervisors only
    pub async fn list_all_workspaces(&self, actor: &UserContext) -> MembershipResult<Vec<Workspace>> {
        if !actor.is_supervisor {
            return Err(MembershipError::Forbidden(
                "only supervisors can list all workspaces".to_string(),
            ));
        }
        Ok(self.memberships.list_workspaces().await?)
    }

    #[instrument(skip(self, actor, changes), fields(actor = %actor.id))]
    pub async fn update_workspace(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        changes: &WorkspaceChanges,
    ) -> MembershipResult<Workspace> {
        let result = self.try_update_workspace(actor, workspace_id, changes).await;
        self.observe(MembershipOperation::UpdateWorkspace.as_str(), result)
    }

    async fn try_update_workspace(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        changes: &WorkspaceChanges,
    ) -> MembershipResult<Workspace> {
        if changes.is_empty() {
            return Err(MembershipError::Invalid("nothing to update".to_string()));
        }
        if changes.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(MembershipError::Invalid(
                "workspace name must not be empty".to_string(),
            ));
        }

        let (mut tx, _) = self.open(workspace_id).await?;
        self.authorize_actor(tx.as_mut(), actor, MembershipOperation::UpdateWorkspace)
            .await?;
        let workspace = tx.update_workspace(changes).await?;
        Self::commit(tx).await?;
        info!("Updated workspace");
        Ok(workspace)
    }

    /// Delete a workspace and all of its membership rows
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete_workspace(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
    ) -> MembershipResult<()> {
        let result = self.try_delete_workspace(actor, workspace_id).await;
        self.observe(MembershipOperation::DeleteWorkspace.as_str(), result)
    }

    async fn try_delete_workspace(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
    ) -> MembershipResult<()> {
        let (mut tx, _) = self.open(workspace_id).await?;
        self.authorize_actor(tx.as_mut(), actor, MembershipOperation::DeleteWorkspace)
            .await?;
        tx.delete_workspace().await?;
        Self::commit(tx).await?;
        info!("Deleted workspace");
        Ok(())
    }

    /// Members of a workspace with their emails; members only
    pub async fn list_members(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
    ) -> MembershipResult<Vec<WorkspaceMember>> {
        let members = {
            let (mut tx, _) = self.open(workspace_id).await?;
            if tx.membership(actor.id).await?.is_none() {
                return Err(MembershipError::Forbidden(
                    "only workspace members can list members".to_string(),
                ));
            }
            tx.members().await?
        };

        let mut listed = Vec::with_capacity(members.len());
        for membership in members {
            // A user deleted since the snapshot is simply left out
            if let Some(user) = self.users.find_user(membership.user_id).await? {
                listed.push(WorkspaceMember {
                    id: user.id,
                    email: user.email,
                    role: membership.role,
                    joined_at: membership.joined_at,
                });
            }
        }
        listed.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.email.cmp(&b.email)));
        Ok(listed)
    }

    /// Add one user to a workspace
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn add_member(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        new: NewMember,
    ) -> MembershipResult<Membership> {
        let result = self.try_add_member(actor, workspace_id, new).await;
        self.observe(MembershipOperation::AddMember.as_str(), result)
    }

    async fn try_add_member(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        new: NewMember,
    ) -> MembershipResult<Membership> {
        let (mut tx, _) = self.open(workspace_id).await?;
        self.authorize_actor(tx.as_mut(), actor, MembershipOperation::AddMember)
            .await?;

        let user = self.find_target(&new.user).await?;
        if tx.membership(user.id).await?.is_some() {
            return Err(MembershipError::AlreadyMember {
                workspace_id,
                user_id: user.id,
            });
        }

        if !new.role.is_admin() && tx.admin_count().await? == 0 {
            info!(user_id = %user.id, "Denied: first member of an adminless workspace must be an admin");
            return Err(MembershipError::no_admin());
        }

        let membership = tx.insert_membership(user.id, new.role).await?;
        Self::commit(tx).await?;
        info!(user_id = %user.id, role = %new.role, "Added member");
        Ok(membership)
    }

    /// Add several users at once; either all are added or none is
    #[instrument(skip(self, actor, members), fields(actor = %actor.id, count = members.len()))]
    pub async fn add_members(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        members: Vec<NewMember>,
    ) -> MembershipResult<Vec<Membership>> {
        let result = self.try_add_members(actor, workspace_id, members).await;
        self.observe("add_members", result)
    }

    async fn try_add_members(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        members: Vec<NewMember>,
    ) -> MembershipResult<Vec<Membership>> {
        if members.is_empty() {
            return Err(MembershipError::Invalid("no members given".to_string()));
        }

        let (mut tx, _) = self.open(workspace_id).await?;
        self.authorize_actor(tx.as_mut(), actor, MembershipOperation::AddMember)
            .await?;

        let adminless = tx.admin_count().await? == 0;
        let mut seen = HashSet::with_capacity(members.len());
        let mut added = Vec::with_capacity(members.len());
        for new in &members {
            let user = self.find_target(&new.user).await?;
            if !seen.insert(user.id) || tx.membership(user.id).await?.is_some() {
                return Err(MembershipError::AlreadyMember {
                    workspace_id,
                    user_id: user.id,
                });
            }
            added.push(tx.insert_membership(user.id, new.role).await?);
        }

        // Dropping the transaction discards the staged rows
        if adminless && !added.iter().any(|m| m.role.is_admin()) {
            info!("Denied: bulk add into an adminless workspace without an admin");
            return Err(MembershipError::no_admin());
        }

        Self::commit(tx).await?;
        info!(added = added.len(), "Added members");
        Ok(added)
    }

    /// Remove a member; the last admin cannot be removed
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn remove_member(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> MembershipResult<()> {
        let result = self.try_remove_member(actor, workspace_id, user_id).await;
        self.observe(MembershipOperation::RemoveMember.as_str(), result)
    }

    async fn try_remove_member(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> MembershipResult<()> {
        let (mut tx, _) = self.open(workspace_id).await?;
        self.authorize_actor(tx.as_mut(), actor, MembershipOperation::RemoveMember)
            .await?;

        let target = tx
            .membership(user_id)
            .await?
            .ok_or(MembershipError::NotMember {
                workspace_id,
                user_id,
            })?;

        if target.role.is_admin() && tx.admin_count().await? <= 1 {
            info!(%user_id, "Denied: would remove the last admin");
            return Err(MembershipError::last_admin("remove"));
        }

        tx.delete_membership(user_id).await?;
        Self::commit(tx).await?;
        info!(%user_id, "Removed member");
        Ok(())
    }

    /// Change a member's role; the last admin cannot be demoted
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn change_role(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> MembershipResult<Membership> {
        let result = self.try_change_role(actor, workspace_id, user_id, role).await;
        self.observe(MembershipOperation::ChangeRole.as_str(), result)
    }

    async fn try_change_role(
        &self,
        actor: &UserContext,
        workspace_id: Uuid,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> MembershipResult<Membership> {
        let (mut tx, _) = self.open(workspace_id).await?;
        self.authorize_actor(tx.as_mut(), actor, MembershipOperation::ChangeRole)
            .await?;

        let target = tx
            .membership(user_id)
            .await?
            .ok_or(MembershipError::NotMember {
                workspace_id,
                user_id,
            })?;

        if target.role == role {
            return Ok(target);
        }

        if target.role.is_admin() && !role.is_admin() && tx.admin_count().await? <= 1 {
            info!(%user_id, new_role = %role, "Denied: would demote the last admin");
            return Err(MembershipError::last_admin("demote"));
        }

        tx.update_role(user_id, role).await?;
        Self::commit(tx).await?;
        info!(%user_id, from = %target.role, to = %role, "Changed member role");
        Ok(Membership { role, ..target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct Fixture {
        engine: MembershipEngine,
        store: Arc<MemoryStore>,
        metrics: Arc<AuthzMetrics>,
    }

    impl Fixture {
        fn new(policy: SupervisorBypass) -> Self {
            let store = Arc::new(MemoryStore::new());
            let metrics = Arc::new(AuthzMetrics::new());
            let engine = MembershipEngine::new(store.clone(), store.clone(), policy)
                .with_metrics(metrics.clone());
            Self {
                engine,
                store,
                metrics,
            }
        }

        async fn user(&self, email: &str, supervisor: bool) -> UserContext {
            let user = self.store.create_user(email, supervisor).await.unwrap();
            UserContext::from(&user)
        }

        async fn role_of(&self, user: &UserContext, workspace: &Workspace) -> Option<WorkspaceRole> {
            self.store
                .membership(user.id, workspace.id)
                .await
                .unwrap()
                .map(|m| m.role)
        }
    }

    #[tokio::test]
    async fn test_create_workspace_makes_creator_admin() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;

        let w = f.engine.create_workspace(&a, " Sales ", None).await.unwrap();
        assert_eq!(w.name, "Sales");
        assert_eq!(f.role_of(&a, &w).await, Some(WorkspaceRole::Admin));
    }

    #[tokio::test]
    async fn test_create_workspace_rejects_blank_name() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;

        let err = f.engine.create_workspace(&a, "  ", None).await.unwrap_err();
        assert!(matches!(err, MembershipError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_add_member_defaults_to_member_and_rejects_duplicate() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        let new: NewMember = serde_json::from_str(r#"{"email": "B@example.com"}"#).unwrap();
        let added = f.engine.add_member(&a, w.id, new.clone()).await.unwrap();
        assert_eq!(added.role, WorkspaceRole::Member);

        let err = f.engine.add_member(&a, w.id, new).await.unwrap_err();
        assert!(matches!(err, MembershipError::AlreadyMember { user_id, .. } if user_id == b.id));
    }

    #[tokio::test]
    async fn test_add_member_unknown_user() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        let err = f
            .engine
            .add_member(&a, w.id, NewMember::by_email("ghost@example.com", WorkspaceRole::Member))
            .await
            .unwrap_err();
        assert_eq!(err, MembershipError::UserNotFound("ghost@example.com".into()));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_add() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let c = f.user("c@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();
        f.engine
            .add_member(&a, w.id, NewMember::by_id(b.id, WorkspaceRole::Member))
            .await
            .unwrap();

        let err = f
            .engine
            .add_member(&b, w.id, NewMember::by_id(c.id, WorkspaceRole::Member))
            .await
            .unwrap_err();
        assert_eq!(err, MembershipError::admins_only("add users"));
    }

    #[tokio::test]
    async fn test_unknown_workspace_checked_before_actor() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;

        let missing = Uuid::new_v4();
        let err = f.engine.remove_member(&a, missing, a.id).await.unwrap_err();
        assert_eq!(err, MembershipError::WorkspaceNotFound(missing));
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_removed_or_demoted() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        let err = f.engine.remove_member(&a, w.id, a.id).await.unwrap_err();
        assert!(matches!(err, MembershipError::InvariantViolation(_)));

        for role in [WorkspaceRole::Member, WorkspaceRole::Consultant] {
            let err = f.engine.change_role(&a, w.id, a.id, role).await.unwrap_err();
            assert!(matches!(err, MembershipError::InvariantViolation(_)));
        }

        assert_eq!(f.role_of(&a, &w).await, Some(WorkspaceRole::Admin));
        assert_eq!(f.metrics.snapshot().invariant_violations, 3);
    }

    #[tokio::test]
    async fn test_admin_can_leave_when_another_admin_exists() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();
        f.engine
            .add_member(&a, w.id, NewMember::by_id(b.id, WorkspaceRole::Admin))
            .await
            .unwrap();

        f.engine.remove_member(&a, w.id, a.id).await.unwrap();
        assert_eq!(f.role_of(&a, &w).await, None);
    }

    #[tokio::test]
    async fn test_change_role_same_role_is_noop() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        let m = f
            .engine
            .change_role(&a, w.id, a.id, WorkspaceRole::Admin)
            .await
            .unwrap();
        assert_eq!(m.role, WorkspaceRole::Admin);
    }

    #[tokio::test]
    async fn test_change_role_of_non_member() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        let err = f
            .engine
            .change_role(&a, w.id, b.id, WorkspaceRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::NotMember { .. }));
    }

    #[tokio::test]
    async fn test_bulk_add_is_all_or_nothing() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let c = f.user("c@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        // c appears twice: nothing is written
        let err = f
            .engine
            .add_members(
                &a,
                w.id,
                vec![
                    NewMember::by_id(b.id, WorkspaceRole::Member),
                    NewMember::by_id(c.id, WorkspaceRole::Consultant),
                    NewMember::by_email("c@example.com", WorkspaceRole::Member),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::AlreadyMember { .. }));
        assert_eq!(f.role_of(&b, &w).await, None);

        let added = f
            .engine
            .add_members(
                &a,
                w.id,
                vec![
                    NewMember::by_id(b.id, WorkspaceRole::Member),
                    NewMember::by_id(c.id, WorkspaceRole::Consultant),
                ],
            )
            .await
            .unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(f.role_of(&c, &w).await, Some(WorkspaceRole::Consultant));
    }

    #[tokio::test]
    async fn test_supervisor_bypass_follows_policy() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let s = f.user("root@example.com", true).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        f.engine
            .add_member(&s, w.id, NewMember::by_id(b.id, WorkspaceRole::Member))
            .await
            .unwrap();
        assert_eq!(
            f.engine.remove_member(&s, w.id, b.id).await.unwrap_err(),
            MembershipError::admins_only("remove users")
        );
        assert!(matches!(
            f.engine
                .change_role(&s, w.id, b.id, WorkspaceRole::Admin)
                .await
                .unwrap_err(),
            MembershipError::Forbidden(_)
        ));

        let strict = MembershipEngine::new(f.store.clone(), f.store.clone(), SupervisorBypass::none());
        assert!(matches!(
            strict.delete_workspace(&s, w.id).await.unwrap_err(),
            MembershipError::Forbidden(_)
        ));
        f.engine.delete_workspace(&s, w.id).await.unwrap();
        assert!(f.store.find_workspace(w.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_workspace() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        let changes = WorkspaceChanges {
            name: Some("Renamed".into()),
            description: Some("Team space".into()),
        };
        let updated = f.engine.update_workspace(&a, w.id, &changes).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert!(updated.updated_at >= w.updated_at);

        let err = f
            .engine
            .update_workspace(&a, w.id, &WorkspaceChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_list_members_requires_membership() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        let members = f.engine.list_members(&a, w.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].email, "a@example.com");

        assert!(matches!(
            f.engine.list_members(&b, w.id).await.unwrap_err(),
            MembershipError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn test_workspace_visibility() {
        let f = Fixture::new(SupervisorBypass::default());
        let a = f.user("a@example.com", false).await;
        let b = f.user("b@example.com", false).await;
        let s = f.user("root@example.com", true).await;
        let w = f.engine.create_workspace(&a, "W", None).await.unwrap();

        assert!(f.engine.get_workspace(&a, w.id).await.is_ok());
        assert!(f.engine.get_workspace(&s, w.id).await.is_ok());
        assert!(f.engine.get_workspace(&b, w.id).await.is_err());

        let mine = f.engine.list_my_workspaces(&a).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].role, WorkspaceRole::Admin);

        assert!(f.engine.list_all_workspaces(&a).await.is_err());
        assert_eq!(f.engine.list_all_workspaces(&s).await.unwrap().len(), 1);
    }
}
