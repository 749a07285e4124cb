//! Permission resolver
//!
//! Computes the permissions a user holds in a module by walking
//! User → Role (scoped to the module) → Permission in the role graph.
//!
//! Nothing is cached: every call reads the current graph, so a role grant
//! or revocation is visible to the very next resolution.

use crate::access_control::types::Role;
use crate::error::StoreError;
use crate::store::RoleGraphStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

/// Resolves `(user, module)` to a set of permission names
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn RoleGraphStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn RoleGraphStore>) -> Self {
        Self { store }
    }

    /// Permission names the user holds in `module`.
    ///
    /// A user with no roles in the module gets an empty set, not an error.
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(
        &self,
        user_id: Uuid,
        module: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        let roles = self.store.roles_for_user_in_module(user_id, module).await?;
        if roles.is_empty() {
            debug!(user_id = %user_id, module, "User has no roles in module");
            return Ok(BTreeSet::new());
        }

        let role_ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
        let permissions: BTreeSet<String> = self
            .store
            .permissions_for_roles(&role_ids)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();

        trace!(
            user_id = %user_id,
            module,
            roles = roles.len(),
            permissions = permissions.len(),
            "Resolved permissions"
        );
        Ok(permissions)
    }

    /// Roles the user holds in `module`
    pub async fn roles(&self, user_id: Uuid, module: &str) -> Result<Vec<Role>, StoreError> {
        self.store.roles_for_user_in_module(user_id, module).await
    }
}
