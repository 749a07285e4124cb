//! Storage collaborators
//!
//! The authorization core talks to persistence only through the traits in
//! this module. Lookups return `Option`/empty collections when nothing is
//! found; errors are reserved for storage failures and integrity violations.
//!
//! Membership writes go through a [`MembershipTransaction`], which holds an
//! exclusive claim on one workspace from `begin` until `commit` or drop.
//! Dropping a transaction without committing discards every staged write.

pub mod memory;

pub use memory::MemoryStore;

use crate::access_control::types::{Module, Permission, Role};
use crate::auth::User;
use crate::error::StoreResult;
use crate::membership::types::{Headcount, Membership, Workspace, WorkspaceChanges, WorkspaceRole};
// async_trait required for dyn-compatibility with Arc<dyn ...Store>
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Persisted Module → Role → Permission graph plus User → Role assignments
#[async_trait]
pub trait RoleGraphStore: Send + Sync {
    /// Insert a module or update its description, keyed by name
    async fn upsert_module(&self, name: &str, description: Option<&str>) -> StoreResult<Module>;

    async fn find_module(&self, name: &str) -> StoreResult<Option<Module>>;

    async fn list_modules(&self) -> StoreResult<Vec<Module>>;

    /// Insert a permission, keyed by its globally unique name.
    ///
    /// An existing permission owned by another module is a `Duplicate`.
    async fn upsert_permission(
        &self,
        module_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> StoreResult<Permission>;

    async fn find_permission(&self, name: &str) -> StoreResult<Option<Permission>>;

    async fn list_permissions(&self, module_id: Uuid) -> StoreResult<Vec<Permission>>;

    /// Insert a role or update its description, keyed by `(name, module)`
    async fn upsert_role(
        &self,
        module_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> StoreResult<Role>;

    async fn find_role(&self, module_id: Uuid, name: &str) -> StoreResult<Option<Role>>;

    async fn list_roles(&self, module_id: Uuid) -> StoreResult<Vec<Role>>;

    /// Delete a role with its permission grants and user assignments.
    ///
    /// Returns `false` when the role did not exist.
    async fn delete_role(&self, role_id: Uuid) -> StoreResult<bool>;

    /// Idempotently grant a permission to a role
    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<()>;

    /// Assign a role to a user, returning `false` if it was already assigned
    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool>;

    /// Revoke a role from a user, returning `false` if it was not assigned
    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool>;

    /// Roles held by the user whose module is named `module`
    async fn roles_for_user_in_module(&self, user_id: Uuid, module: &str)
    -> StoreResult<Vec<Role>>;

    /// Distinct permissions granted by any of the given roles
    async fn permissions_for_roles(&self, role_ids: &[Uuid]) -> StoreResult<Vec<Permission>>;

    /// Users holding the role
    async fn users_with_role(&self, role_id: Uuid) -> StoreResult<Vec<Uuid>>;
}

/// Registered users
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user; a taken email is a `Duplicate`
    async fn create_user(&self, email: &str, is_supervisor: bool) -> StoreResult<User>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Set the supervisor flag, returning the updated user if it exists
    async fn set_supervisor(&self, id: Uuid, is_supervisor: bool) -> StoreResult<Option<User>>;
}

/// Workspaces and their membership rows
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Create a workspace with `creator` as its sole ADMIN, atomically
    async fn create_workspace(
        &self,
        name: &str,
        description: Option<&str>,
        creator: Uuid,
    ) -> StoreResult<(Workspace, Membership)>;

    async fn find_workspace(&self, id: Uuid) -> StoreResult<Option<Workspace>>;

    async fn list_workspaces(&self) -> StoreResult<Vec<Workspace>>;

    /// Membership row for `(user, workspace)`, read outside any transaction
    async fn membership(&self, user_id: Uuid, workspace_id: Uuid)
    -> StoreResult<Option<Membership>>;

    async fn workspaces_for_user(&self, user_id: Uuid)
    -> StoreResult<Vec<(Workspace, Membership)>>;

    /// Open a transaction scoped to one workspace.
    ///
    /// Waits until no other transaction holds the workspace.
    async fn begin(&self, workspace_id: Uuid) -> StoreResult<Box<dyn MembershipTransaction>>;

    /// Open a transaction that deletes a user together with their role
    /// assignments and membership rows
    async fn begin_user_removal(&self, user_id: Uuid) -> StoreResult<Box<dyn UserRemoval>>;
}

/// Exclusive, all-or-nothing unit of work over one workspace.
///
/// Reads observe the writes staged earlier in the same transaction.
#[async_trait]
pub trait MembershipTransaction: Send {
    fn workspace_id(&self) -> Uuid;

    async fn workspace(&mut self) -> StoreResult<Option<Workspace>>;

    async fn membership(&mut self, user_id: Uuid) -> StoreResult<Option<Membership>>;

    async fn members(&mut self) -> StoreResult<Vec<Membership>>;

    async fn admin_count(&mut self) -> StoreResult<usize>;

    async fn insert_membership(
        &mut self,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> StoreResult<Membership>;

    async fn delete_membership(&mut self, user_id: Uuid) -> StoreResult<()>;

    async fn update_role(&mut self, user_id: Uuid, role: WorkspaceRole) -> StoreResult<()>;

    async fn update_workspace(&mut self, changes: &WorkspaceChanges) -> StoreResult<Workspace>;

    /// Stage deletion of the workspace and every membership row it has
    async fn delete_workspace(&mut self) -> StoreResult<()>;

    /// Apply every staged write atomically
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Exclusive unit of work deleting one user
#[async_trait]
pub trait UserRemoval: Send {
    fn user_id(&self) -> Uuid;

    /// Per-workspace counts for every workspace the user belongs to
    async fn headcounts(&mut self) -> StoreResult<Vec<Headcount>>;

    /// Delete the user, their role assignments and their membership rows
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Handles to every storage collaborator, usually backed by one store
#[derive(Clone)]
pub struct Stores {
    pub roles: Arc<dyn RoleGraphStore>,
    pub users: Arc<dyn UserStore>,
    pub memberships: Arc<dyn MembershipStore>,
}

impl Stores {
    /// Use one backend for all three collaborators
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: RoleGraphStore + UserStore + MembershipStore + 'static,
    {
        Self {
            roles: backend.clone(),
            users: backend.clone(),
            memberships: backend,
        }
    }

    /// Fresh in-process store
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}
