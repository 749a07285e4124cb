//! In-process transactional store
//!
//! All rows live behind a single `RwLock`. Membership transactions
//! additionally claim a per-workspace async mutex for their whole lifetime,
//! work on a private copy of that workspace's rows, and publish the copy
//! under the write lock at commit. A transaction dropped before commit
//! (including one whose future was cancelled) publishes nothing.

use crate::access_control::types::{Module, Permission, Role};
use crate::auth::User;
use crate::error::{StoreError, StoreResult};
use crate::membership::types::{Headcount, Membership, Workspace, WorkspaceChanges, WorkspaceRole};
use crate::store::{MembershipStore, MembershipTransaction, RoleGraphStore, UserRemoval, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Every table, guarded by one lock
#[derive(Default)]
struct State {
    modules: HashMap<Uuid, Module>,
    permissions: HashMap<Uuid, Permission>,
    roles: HashMap<Uuid, Role>,
    role_permissions: HashSet<(Uuid, Uuid)>,
    user_roles: HashSet<(Uuid, Uuid)>,
    users: HashMap<Uuid, User>,
    workspaces: HashMap<Uuid, Workspace>,
    /// workspace id → user id → row
    memberships: HashMap<Uuid, BTreeMap<Uuid, Membership>>,
}

type WorkspaceLocks = Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>;

/// In-memory implementation of every storage trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    locks: Arc<WorkspaceLocks>,
}

// Helpers for lock access with poison recovery

fn read_state(state: &RwLock<State>) -> RwLockReadGuard<'_, State> {
    state.read().unwrap_or_else(|poisoned| {
        warn!("store lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write_state(state: &RwLock<State>) -> RwLockWriteGuard<'_, State> {
    state.write().unwrap_or_else(|poisoned| {
        warn!("store lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn workspace_lock(locks: &WorkspaceLocks, workspace_id: Uuid) -> Arc<AsyncMutex<()>> {
    let mut map = locks.lock().unwrap_or_else(|poisoned| {
        warn!("workspace lock table poisoned, recovering");
        poisoned.into_inner()
    });
    map.entry(workspace_id).or_default().clone()
}

fn forget_workspace_lock(locks: &WorkspaceLocks, workspace_id: Uuid) {
    let mut map = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.remove(&workspace_id);
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        read_state(&self.state)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        write_state(&self.state)
    }

    #[cfg(test)]
    fn has_workspace_lock(&self, workspace_id: Uuid) -> bool {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&workspace_id)
    }
}

#[async_trait]
impl RoleGraphStore for MemoryStore {
    async fn upsert_module(&self, name: &str, description: Option<&str>) -> StoreResult<Module> {
        let mut state = self.write();
        if let Some(module) = state.modules.values_mut().find(|m| m.name == name) {
            if let Some(description) = description {
                module.description = Some(description.to_string());
            }
            return Ok(module.clone());
        }

        let module = Module {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        state.modules.insert(module.id, module.clone());
        Ok(module)
    }

    async fn find_module(&self, name: &str) -> StoreResult<Option<Module>> {
        Ok(self.read().modules.values().find(|m| m.name == name).cloned())
    }

    async fn list_modules(&self) -> StoreResult<Vec<Module>> {
        let mut modules: Vec<Module> = self.read().modules.values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }

    async fn upsert_permission(
        &self,
        module_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> StoreResult<Permission> {
        let mut state = self.write();
        if !state.modules.contains_key(&module_id) {
            return Err(StoreError::MissingReference {
                entity: "module",
                key: module_id.to_string(),
            });
        }

        if let Some(permission) = state.permissions.values_mut().find(|p| p.name == name) {
            if permission.module_id != module_id {
                return Err(StoreError::Duplicate {
                    entity: "permission",
                    key: name.to_string(),
                });
            }
            if let Some(description) = description {
                permission.description = Some(description.to_string());
            }
            return Ok(permission.clone());
        }

        let permission = Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            module_id,
        };
        state.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn find_permission(&self, name: &str) -> StoreResult<Option<Permission>> {
        Ok(self
            .read()
            .permissions
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_permissions(&self, module_id: Uuid) -> StoreResult<Vec<Permission>> {
        let mut permissions: Vec<Permission> = self
            .read()
            .permissions
            .values()
            .filter(|p| p.module_id == module_id)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn upsert_role(
        &self,
        module_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> StoreResult<Role> {
        let mut state = self.write();
        if !state.modules.contains_key(&module_id) {
            return Err(StoreError::MissingReference {
                entity: "module",
                key: module_id.to_string(),
            });
        }

        if let Some(role) = state
            .roles
            .values_mut()
            .find(|r| r.module_id == module_id && r.name == name)
        {
            if let Some(description) = description {
                role.description = Some(description.to_string());
            }
            return Ok(role.clone());
        }

        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            module_id,
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn find_role(&self, module_id: Uuid, name: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .read()
            .roles
            .values()
            .find(|r| r.module_id == module_id && r.name == name)
            .cloned())
    }

    async fn list_roles(&self, module_id: Uuid) -> StoreResult<Vec<Role>> {
        let mut roles: Vec<Role> = self
            .read()
            .roles
            .values()
            .filter(|r| r.module_id == module_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn delete_role(&self, role_id: Uuid) -> StoreResult<bool> {
        let mut state = self.write();
        if state.roles.remove(&role_id).is_none() {
            return Ok(false);
        }
        state.role_permissions.retain(|(role, _)| *role != role_id);
        state.user_roles.retain(|(_, role)| *role != role_id);
        debug!(role_id = %role_id, "Deleted role with its grants and assignments");
        Ok(true)
    }

    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<()> {
        let mut state = self.write();
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::MissingReference {
                entity: "role",
                key: role_id.to_string(),
            });
        }
        if !state.permissions.contains_key(&permission_id) {
            return Err(StoreError::MissingReference {
                entity: "permission",
                key: permission_id.to_string(),
            });
        }
        state.role_permissions.insert((role_id, permission_id));
        Ok(())
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool> {
        let mut state = self.write();
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference {
                entity: "user",
                key: user_id.to_string(),
            });
        }
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::MissingReference {
                entity: "role",
                key: role_id.to_string(),
            });
        }
        Ok(state.user_roles.insert((user_id, role_id)))
    }

    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool> {
        Ok(self.write().user_roles.remove(&(user_id, role_id)))
    }

    async fn roles_for_user_in_module(
        &self,
        user_id: Uuid,
        module: &str,
    ) -> StoreResult<Vec<Role>> {
        let state = self.read();
        let Some(module) = state.modules.values().find(|m| m.name == module) else {
            return Ok(Vec::new());
        };

        let mut roles: Vec<Role> = state
            .user_roles
            .iter()
            .filter(|(user, _)| *user == user_id)
            .filter_map(|(_, role_id)| state.roles.get(role_id))
            .filter(|role| role.module_id == module.id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn permissions_for_roles(&self, role_ids: &[Uuid]) -> StoreResult<Vec<Permission>> {
        let state = self.read();
        let wanted: HashSet<&Uuid> = role_ids.iter().collect();
        let permission_ids: BTreeSet<Uuid> = state
            .role_permissions
            .iter()
            .filter(|(role, _)| wanted.contains(role))
            .map(|(_, permission)| *permission)
            .collect();

        let mut permissions: Vec<Permission> = permission_ids
            .iter()
            .filter_map(|id| state.permissions.get(id))
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn users_with_role(&self, role_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut users: Vec<Uuid> = self
            .read()
            .user_roles
            .iter()
            .filter(|(_, role)| *role == role_id)
            .map(|(user, _)| *user)
            .collect();
        users.sort();
        Ok(users)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, email: &str, is_supervisor: bool) -> StoreResult<User> {
        let email = email.trim();
        let mut state = self.write();
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email))
        {
            return Err(StoreError::Duplicate {
                entity: "user",
                key: email.to_string(),
            });
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            is_supervisor,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim();
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn set_supervisor(&self, id: Uuid, is_supervisor: bool) -> StoreResult<Option<User>> {
        let mut state = self.write();
        Ok(state.users.get_mut(&id).map(|user| {
            user.is_supervisor = is_supervisor;
            user.clone()
        }))
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn create_workspace(
        &self,
        name: &str,
        description: Option<&str>,
        creator: Uuid,
    ) -> StoreResult<(Workspace, Membership)> {
        let mut state = self.write();
        if !state.users.contains_key(&creator) {
            return Err(StoreError::MissingReference {
                entity: "user",
                key: creator.to_string(),
            });
        }

        let now = Utc::now();
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        let membership = Membership {
            user_id: creator,
            workspace_id: workspace.id,
            role: WorkspaceRole::Admin,
            joined_at: now,
        };

        state.workspaces.insert(workspace.id, workspace.clone());
        state
            .memberships
            .entry(workspace.id)
            .or_default()
            .insert(creator, membership.clone());
        Ok((workspace, membership))
    }

    async fn find_workspace(&self, id: Uuid) -> StoreResult<Option<Workspace>> {
        Ok(self.read().workspaces.get(&id).cloned())
    }

    async fn list_workspaces(&self) -> StoreResult<Vec<Workspace>> {
        let mut workspaces: Vec<Workspace> = self.read().workspaces.values().cloned().collect();
        workspaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workspaces)
    }

    async fn membership(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .read()
            .memberships
            .get(&workspace_id)
            .and_then(|rows| rows.get(&user_id))
            .cloned())
    }

    async fn workspaces_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<(Workspace, Membership)>> {
        let state = self.read();
        let mut found: Vec<(Workspace, Membership)> = state
            .memberships
            .iter()
            .filter_map(|(workspace_id, rows)| {
                let membership = rows.get(&user_id)?;
                let workspace = state.workspaces.get(workspace_id)?;
                Some((workspace.clone(), membership.clone()))
            })
            .collect();
        found.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn begin(&self, workspace_id: Uuid) -> StoreResult<Box<dyn MembershipTransaction>> {
        // Checked and registered under the state lock so a committing delete
        // cannot forget the entry in between. Unknown ids never get one.
        let lock = {
            let state = self.read();
            state
                .workspaces
                .contains_key(&workspace_id)
                .then(|| workspace_lock(&self.locks, workspace_id))
        };
        let claim = match lock {
            Some(lock) => Some(lock.lock_owned().await),
            None => None,
        };

        // Snapshot only after the claim is held
        let (workspace, members) = {
            let state = self.read();
            (
                state.workspaces.get(&workspace_id).cloned(),
                state
                    .memberships
                    .get(&workspace_id)
                    .cloned()
                    .unwrap_or_default(),
            )
        };

        Ok(Box::new(MemoryTransaction {
            workspace_id,
            state: self.state.clone(),
            locks: self.locks.clone(),
            _claim: claim,
            workspace,
            members,
            deleted: false,
            dirty: false,
        }))
    }

    async fn begin_user_removal(&self, user_id: Uuid) -> StoreResult<Box<dyn UserRemoval>> {
        let (workspace_ids, locks): (BTreeSet<Uuid>, Vec<_>) = {
            let state = self.read();
            let ids: BTreeSet<Uuid> = state
                .memberships
                .iter()
                .filter(|(_, rows)| rows.contains_key(&user_id))
                .map(|(id, _)| *id)
                .collect();
            let locks = ids.iter().map(|id| workspace_lock(&self.locks, *id)).collect();
            (ids, locks)
        };

        // Sorted acquisition order keeps concurrent removals deadlock-free
        let mut claims = Vec::with_capacity(locks.len());
        for lock in locks {
            claims.push(lock.lock_owned().await);
        }

        Ok(Box::new(MemoryUserRemoval {
            user_id,
            state: self.state.clone(),
            claimed: workspace_ids,
            _claims: claims,
        }))
    }
}

/// Private working copy of one workspace's rows
struct MemoryTransaction {
    workspace_id: Uuid,
    state: Arc<RwLock<State>>,
    locks: Arc<WorkspaceLocks>,
    _claim: Option<OwnedMutexGuard<()>>,
    workspace: Option<Workspace>,
    members: BTreeMap<Uuid, Membership>,
    deleted: bool,
    dirty: bool,
}

impl MemoryTransaction {
    fn live_workspace(&self) -> StoreResult<&Workspace> {
        match &self.workspace {
            Some(workspace) if !self.deleted => Ok(workspace),
            _ => Err(StoreError::MissingReference {
                entity: "workspace",
                key: self.workspace_id.to_string(),
            }),
        }
    }

    fn missing_membership(&self, user_id: Uuid) -> StoreError {
        StoreError::MissingReference {
            entity: "membership",
            key: format!("{}/{}", self.workspace_id, user_id),
        }
    }
}

#[async_trait]
impl MembershipTransaction for MemoryTransaction {
    fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    async fn workspace(&mut self) -> StoreResult<Option<Workspace>> {
        Ok(self.live_workspace().ok().cloned())
    }

    async fn membership(&mut self, user_id: Uuid) -> StoreResult<Option<Membership>> {
        Ok(self.members.get(&user_id).cloned())
    }

    async fn members(&mut self) -> StoreResult<Vec<Membership>> {
        Ok(self.members.values().cloned().collect())
    }

    async fn admin_count(&mut self) -> StoreResult<usize> {
        Ok(self.members.values().filter(|m| m.role.is_admin()).count())
    }

    async fn insert_membership(
        &mut self,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> StoreResult<Membership> {
        self.live_workspace()?;
        if self.members.contains_key(&user_id) {
            return Err(StoreError::Duplicate {
                entity: "membership",
                key: format!("{}/{}", self.workspace_id, user_id),
            });
        }

        let membership = Membership {
            user_id,
            workspace_id: self.workspace_id,
            role,
            joined_at: Utc::now(),
        };
        self.members.insert(user_id, membership.clone());
        self.dirty = true;
        Ok(membership)
    }

    async fn delete_membership(&mut self, user_id: Uuid) -> StoreResult<()> {
        self.live_workspace()?;
        if self.members.remove(&user_id).is_none() {
            return Err(self.missing_membership(user_id));
        }
        self.dirty = true;
        Ok(())
    }

    async fn update_role(&mut self, user_id: Uuid, role: WorkspaceRole) -> StoreResult<()> {
        self.live_workspace()?;
        let missing = self.missing_membership(user_id);
        let membership = self.members.get_mut(&user_id).ok_or(missing)?;
        membership.role = role;
        self.dirty = true;
        Ok(())
    }

    async fn update_workspace(&mut self, changes: &WorkspaceChanges) -> StoreResult<Workspace> {
        self.live_workspace()?;
        let Some(workspace) = self.workspace.as_mut() else {
            return Err(StoreError::MissingReference {
                entity: "workspace",
                key: self.workspace_id.to_string(),
            });
        };

        if let Some(name) = &changes.name {
            workspace.name = name.clone();
        }
        if let Some(description) = &changes.description {
            workspace.description = Some(description.clone());
        }
        workspace.updated_at = Utc::now();
        self.dirty = true;
        Ok(workspace.clone())
    }

    async fn delete_workspace(&mut self) -> StoreResult<()> {
        self.live_workspace()?;
        self.deleted = true;
        self.members.clear();
        self.dirty = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let this = *self;
        {
            let mut state = write_state(&this.state);
            if this.deleted {
                state.workspaces.remove(&this.workspace_id);
                state.memberships.remove(&this.workspace_id);
                forget_workspace_lock(&this.locks, this.workspace_id);
            } else if let Some(workspace) = this.workspace {
                if let Some(orphan) = this.members.keys().find(|id| !state.users.contains_key(*id)) {
                    return Err(StoreError::MissingReference {
                        entity: "user",
                        key: orphan.to_string(),
                    });
                }
                state.workspaces.insert(this.workspace_id, workspace);
                state.memberships.insert(this.workspace_id, this.members);
            }
        }

        debug!(workspace_id = %this.workspace_id, deleted = this.deleted, "Committed membership transaction");
        Ok(())
    }
}

struct MemoryUserRemoval {
    user_id: Uuid,
    state: Arc<RwLock<State>>,
    claimed: BTreeSet<Uuid>,
    _claims: Vec<OwnedMutexGuard<()>>,
}

#[async_trait]
impl UserRemoval for MemoryUserRemoval {
    fn user_id(&self) -> Uuid {
        self.user_id
    }

    async fn headcounts(&mut self) -> StoreResult<Vec<Headcount>> {
        let state = read_state(&self.state);
        Ok(self
            .claimed
            .iter()
            .filter_map(|workspace_id| {
                let rows = state.memberships.get(workspace_id)?;
                let own = rows.get(&self.user_id)?;
                Some(Headcount {
                    workspace_id: *workspace_id,
                    role: own.role,
                    admins: rows.values().filter(|m| m.role.is_admin()).count(),
                    members: rows.len(),
                })
            })
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut state = write_state(&self.state);
        if !state.users.contains_key(&self.user_id) {
            return Err(StoreError::MissingReference {
                entity: "user",
                key: self.user_id.to_string(),
            });
        }

        let joined_elsewhere = state
            .memberships
            .iter()
            .any(|(id, rows)| !self.claimed.contains(id) && rows.contains_key(&self.user_id));
        if joined_elsewhere {
            return Err(StoreError::Conflict(format!(
                "user {} joined a workspace while being removed",
                self.user_id
            )));
        }

        for workspace_id in &self.claimed {
            if let Some(rows) = state.memberships.get_mut(workspace_id) {
                rows.remove(&self.user_id);
            }
        }
        state.user_roles.retain(|(user, _)| *user != self.user_id);
        state.users.remove(&self.user_id);
        debug!(user_id = %self.user_id, workspaces = self.claimed.len(), "Removed user");
        Ok(())
    }
}
