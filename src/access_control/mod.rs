//! Access control module
//!
//! Module-scoped, role-based authorization.
//!
//! ## Model
//!
//! ```text
//! User ──< UserRole >── Role ──< RolePermission >── Permission
//!                        │                              │
//!                        └────────── Module ────────────┘
//! ```
//!
//! A permission is named `<module>.<resource>.<action>` and belongs to
//! exactly one module; a role only grants permissions of its own module.
//! A route declares a module and a list of permissions, and a request
//! passes if the caller holds **any** of them in that module.
//!
//! ## Example Configuration
//!
//! ```toml
//! [catalog]
//! builtin = true                  # seed the CRM module
//!
//! [[catalog.modules]]
//! name = "PM"
//! description = "Project management"
//! permissions = [
//!     { name = "pm.task.read", description = "View tasks" },
//!     { name = "pm.task.update", description = "Update tasks" },
//! ]
//! roles = [{ name = "PM Viewer", permissions = ["pm.task.read"] }]
//! ```

pub mod catalog;
pub mod guard;
pub mod layer;
pub mod resolver;
pub mod types;

pub use catalog::{CRM, CatalogProvisioner, crm_module, validate_module_def};
pub use guard::{AccessDecision, ModulePermissionGuard, authorize, validate_declaration};
pub use layer::{RequirePermissions, RequirePermissionsLayer};
pub use resolver::PermissionResolver;
pub use types::{Module, ModuleDef, Permission, PermissionDef, Role, RoleDef, RoleGrants};
