//! Permission catalog
//!
//! The built-in CRM module definition and the provisioner that writes
//! module definitions into the role graph. Provisioning is idempotent:
//! running it twice leaves the graph unchanged.

use crate::access_control::types::{
    Module, ModuleDef, Permission, PermissionDef, Role, RoleDef, RoleGrants, belongs_to_module,
    validate_module_name, validate_permission_name,
};
use crate::error::CatalogError;
use crate::store::{RoleGraphStore, UserStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Name of the built-in CRM module
pub const CRM: &str = "CRM";

const CRM_PERMISSIONS: &[(&str, &str)] = &[
    ("crm.organization.create", "Create organizations"),
    ("crm.organization.read", "View organizations"),
    ("crm.organization.update", "Update organizations"),
    ("crm.organization.delete", "Delete organizations"),
    ("crm.person.create", "Create contacts"),
    ("crm.person.read", "View contacts"),
    ("crm.person.update", "Update contacts"),
    ("crm.person.delete", "Delete contacts"),
    ("crm.lead.create", "Create leads"),
    ("crm.lead.read", "View leads"),
    ("crm.lead.update", "Update leads"),
    ("crm.lead.delete", "Delete leads"),
    ("crm.lead.convert", "Convert leads to deals"),
    ("crm.deal.create", "Create deals"),
    ("crm.deal.read", "View deals"),
    ("crm.deal.update", "Update deals"),
    ("crm.deal.delete", "Delete deals"),
    ("crm.deal.change_stage", "Move deals between stages"),
    ("crm.project.create", "Create projects"),
    ("crm.project.read", "View projects"),
    ("crm.project.update", "Update projects"),
    ("crm.project.delete", "Delete projects"),
    ("crm.activity.create", "Create activities"),
    ("crm.activity.read", "View activities"),
    ("crm.activity.update", "Update activities"),
    ("crm.activity.delete", "Delete activities"),
    ("crm.product.create", "Create products"),
    ("crm.product.read", "View products"),
    ("crm.product.update", "Update products"),
    ("crm.product.delete", "Delete products"),
    ("crm.email.create", "Send emails"),
    ("crm.email.read", "View emails"),
    ("crm.email.delete", "Delete emails"),
    ("crm.reports.view", "View CRM reports"),
    ("crm.dashboard.view", "View CRM dashboard"),
    ("crm.settings.manage", "Manage CRM settings"),
    ("crm.pipeline.create", "Create sales pipelines"),
    ("crm.pipeline.read", "View sales pipelines"),
    ("crm.pipeline.update", "Update sales pipelines"),
    ("crm.pipeline.delete", "Delete sales pipelines"),
    ("crm.pipeline.manage_stages", "Manage pipeline stages"),
    ("crm.pipeline.set_default", "Set default pipeline"),
    ("crm.status.create", "Create custom statuses"),
    ("crm.status.read", "View statuses"),
    ("crm.status.update", "Update statuses"),
    ("crm.status.delete", "Delete statuses"),
    ("crm.status.set_default", "Set default status"),
    ("crm.tag.create", "Create tags"),
    ("crm.tag.read", "View tags"),
    ("crm.tag.update", "Update tags"),
    ("crm.tag.delete", "Delete tags"),
    ("crm.tag.assign", "Assign tags to entities"),
    ("crm.tag.unassign", "Remove tags from entities"),
];

const SALES_MANAGER: &[&str] = &[
    "crm.organization.read",
    "crm.organization.create",
    "crm.organization.update",
    "crm.person.read",
    "crm.person.create",
    "crm.person.update",
    "crm.lead.read",
    "crm.lead.create",
    "crm.lead.update",
    "crm.lead.convert",
    "crm.deal.read",
    "crm.deal.create",
    "crm.deal.update",
    "crm.deal.change_stage",
    "crm.activity.read",
    "crm.activity.create",
    "crm.activity.update",
    "crm.product.read",
    "crm.email.read",
    "crm.email.create",
    "crm.reports.view",
    "crm.dashboard.view",
    "crm.pipeline.read",
    "crm.pipeline.update",
    "crm.pipeline.manage_stages",
    "crm.status.read",
    "crm.status.update",
    "crm.tag.create",
    "crm.tag.read",
    "crm.tag.update",
    "crm.tag.assign",
    "crm.tag.unassign",
];

const SALES_REPRESENTATIVE: &[&str] = &[
    "crm.organization.read",
    "crm.organization.create",
    "crm.person.read",
    "crm.person.create",
    "crm.lead.read",
    "crm.lead.create",
    "crm.lead.update",
    "crm.deal.read",
    "crm.deal.create",
    "crm.deal.update",
    "crm.deal.change_stage",
    "crm.activity.read",
    "crm.activity.create",
    "crm.email.read",
    "crm.email.create",
    "crm.dashboard.view",
    "crm.pipeline.read",
    "crm.status.read",
    "crm.tag.read",
    "crm.tag.assign",
    "crm.tag.unassign",
];

const CRM_VIEWER: &[&str] = &[
    "crm.organization.read",
    "crm.person.read",
    "crm.lead.read",
    "crm.deal.read",
    "crm.project.read",
    "crm.activity.read",
    "crm.product.read",
    "crm.email.read",
    "crm.dashboard.view",
    "crm.tag.read",
];

fn role_def(name: &str, description: &str, permissions: &[&str]) -> RoleDef {
    RoleDef {
        name: name.to_string(),
        description: Some(description.to_string()),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

/// The built-in CRM module with its permissions and four standard roles
pub fn crm_module() -> ModuleDef {
    let all: Vec<&str> = CRM_PERMISSIONS.iter().map(|(name, _)| *name).collect();
    ModuleDef {
        name: CRM.to_string(),
        description: Some("Client Relationship Management Module".to_string()),
        permissions: CRM_PERMISSIONS
            .iter()
            .map(|(name, description)| PermissionDef::new(*name, *description))
            .collect(),
        roles: vec![
            role_def("CRM Admin", "Full access to all CRM features", &all),
            role_def(
                "Sales Manager",
                "Manage sales team and view all deals",
                SALES_MANAGER,
            ),
            role_def(
                "Sales Representative",
                "Handle leads and deals",
                SALES_REPRESENTATIVE,
            ),
            role_def("CRM Viewer", "Read-only access to CRM", CRM_VIEWER),
        ],
    }
}

/// Check a module definition without touching storage.
///
/// Every permission must be well formed and carry the module's prefix, and
/// every role may only reference permissions declared by the same module.
pub fn validate_module_def(def: &ModuleDef) -> Result<(), CatalogError> {
    validate_module_name(&def.name).map_err(|reason| CatalogError::InvalidPermission {
        name: def.name.clone(),
        reason: format!("invalid module name: {}", reason),
    })?;

    let mut declared = HashSet::new();
    for permission in &def.permissions {
        check_permission_for_module(&permission.name, &def.name)?;
        if !declared.insert(permission.name.as_str()) {
            return Err(CatalogError::Conflict {
                entity: "permission",
                key: permission.name.clone(),
            });
        }
    }

    for role in &def.roles {
        for permission in &role.permissions {
            check_permission_for_module(permission, &def.name)?;
            if !declared.contains(permission.as_str()) {
                return Err(CatalogError::NotFound {
                    entity: "permission",
                    key: format!("{} (granted by role '{}')", permission, role.name),
                });
            }
        }
    }

    Ok(())
}

fn check_permission_for_module(permission: &str, module: &str) -> Result<(), CatalogError> {
    validate_permission_name(permission).map_err(|reason| CatalogError::InvalidPermission {
        name: permission.to_string(),
        reason,
    })?;

    if !belongs_to_module(permission, module) {
        return Err(CatalogError::InvalidPermission {
            name: permission.to_string(),
            reason: format!("must start with '{}.'", module.to_lowercase()),
        });
    }
    Ok(())
}

/// Writes and administers the role graph
#[derive(Clone)]
pub struct CatalogProvisioner {
    roles: Arc<dyn RoleGraphStore>,
    users: Arc<dyn UserStore>,
}

impl CatalogProvisioner {
    pub fn new(roles: Arc<dyn RoleGraphStore>, users: Arc<dyn UserStore>) -> Self {
        Self { roles, users }
    }

    /// Provision a whole module definition.
    ///
    /// The definition is validated before anything is written.
    #[instrument(skip(self, def), fields(module = %def.name))]
    pub async fn provision(&self, def: &ModuleDef) -> Result<Module, CatalogError> {
        validate_module_def(def)?;

        let module = self
            .roles
            .upsert_module(&def.name, def.description.as_deref())
            .await?;

        for permission in &def.permissions {
            self.roles
                .upsert_permission(module.id, &permission.name, permission.description.as_deref())
                .await?;
        }

        for role in &def.roles {
            let stored = self
                .roles
                .upsert_role(module.id, &role.name, role.description.as_deref())
                .await?;
            for permission in &role.permissions {
                self.grant_to_role(&module, &stored, permission).await?;
            }
        }

        info!(
            module = %module.name,
            permissions = def.permissions.len(),
            roles = def.roles.len(),
            "Provisioned module"
        );
        Ok(module)
    }

    /// Grant a permission to a role of the same module
    pub async fn grant(
        &self,
        module: &str,
        role: &str,
        permission: &str,
    ) -> Result<(), CatalogError> {
        let module = self.module(module).await?;
        let role = self.role(&module, role).await?;
        self.grant_to_role(&module, &role, permission).await
    }

    async fn grant_to_role(
        &self,
        module: &Module,
        role: &Role,
        permission: &str,
    ) -> Result<(), CatalogError> {
        let stored = self
            .roles
            .find_permission(permission)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                entity: "permission",
                key: permission.to_string(),
            })?;

        if stored.module_id != module.id || role.module_id != module.id {
            let permission_module = self
                .roles
                .list_modules()
                .await?
                .into_iter()
                .find(|m| m.id == stored.module_id)
                .map(|m| m.name)
                .unwrap_or_else(|| stored.module_id.to_string());
            return Err(CatalogError::CrossModuleGrant {
                permission: permission.to_string(),
                permission_module,
                role_module: module.name.clone(),
            });
        }

        self.roles.grant_permission(role.id, stored.id).await?;
        debug!(role = %role.name, permission, "Granted permission");
        Ok(())
    }

    /// Assign a module role to a user; returns `false` if already assigned
    #[instrument(skip(self))]
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        module: &str,
        role: &str,
    ) -> Result<bool, CatalogError> {
        self.require_user(user_id).await?;
        let module = self.module(module).await?;
        let role = self.role(&module, role).await?;
        let assigned = self.roles.assign_role(user_id, role.id).await?;
        info!(user_id = %user_id, module = %module.name, role = %role.name, assigned, "Assigned role");
        Ok(assigned)
    }

    /// Revoke a module role from a user; returns `false` if it was not held
    #[instrument(skip(self))]
    pub async fn revoke_role(
        &self,
        user_id: Uuid,
        module: &str,
        role: &str,
    ) -> Result<bool, CatalogError> {
        let module = self.module(module).await?;
        let role = self.role(&module, role).await?;
        let revoked = self.roles.revoke_role(user_id, role.id).await?;
        info!(user_id = %user_id, module = %module.name, role = %role.name, revoked, "Revoked role");
        Ok(revoked)
    }

    /// Delete a role together with its grants and assignments
    #[instrument(skip(self))]
    pub async fn delete_role(&self, module: &str, role: &str) -> Result<(), CatalogError> {
        let module = self.module(module).await?;
        let role = self.role(&module, role).await?;
        self.roles.delete_role(role.id).await?;
        info!(module = %module.name, role = %role.name, "Deleted role");
        Ok(())
    }

    /// Every role of a module with the permission names it grants
    pub async fn roles_with_grants(&self, module: &str) -> Result<Vec<RoleGrants>, CatalogError> {
        let module = self.module(module).await?;
        let mut result = Vec::new();
        for role in self.roles.list_roles(module.id).await? {
            let permissions = self
                .roles
                .permissions_for_roles(&[role.id])
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect();
            result.push(RoleGrants { role, permissions });
        }
        Ok(result)
    }

    pub async fn permissions(&self, module: &str) -> Result<Vec<Permission>, CatalogError> {
        let module = self.module(module).await?;
        Ok(self.roles.list_permissions(module.id).await?)
    }

    pub async fn modules(&self) -> Result<Vec<Module>, CatalogError> {
        Ok(self.roles.list_modules().await?)
    }

    async fn module(&self, name: &str) -> Result<Module, CatalogError> {
        self.roles
            .find_module(name)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                entity: "module",
                key: name.to_string(),
            })
    }

    async fn role(&self, module: &Module, name: &str) -> Result<Role, CatalogError> {
        self.roles
            .find_role(module.id, name)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                entity: "role",
                key: format!("{}/{}", module.name, name),
            })
    }

    async fn require_user(&self, user_id: Uuid) -> Result<(), CatalogError> {
        match self.users.find_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(CatalogError::NotFound {
                entity: "user",
                key: user_id.to_string(),
            }),
        }
    }
}
