//! Module permission guard
//!
//! A guard is the `(module, permissions)` declaration of one route. It is
//! validated when constructed, so a malformed declaration fails at router
//! build time instead of on the first request.
//!
//! Decision procedure, in order:
//! 1. No required permissions → allow
//! 2. No authenticated user → `Unauthenticated`
//! 3. User holds nothing in the module → `Forbidden` ("no roles")
//! 4. User holds at least one required permission → allow (OR semantics)
//! 5. Otherwise → `Forbidden`

use crate::access_control::catalog::CRM;
use crate::access_control::resolver::PermissionResolver;
use crate::access_control::types::belongs_to_module;
use crate::auth::UserContext;
use crate::error::{GuardConfigError, GuardError};
use serde::Serialize;
use tracing::{debug, error, info};

/// Result of an access check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum AccessDecision {
    /// Access is allowed
    Allowed,
    /// Access is denied with a reason
    Denied(String),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AccessDecision::Denied(_))
    }
}

impl From<&Result<(), GuardError>> for AccessDecision {
    fn from(result: &Result<(), GuardError>) -> Self {
        match result {
            Ok(()) => AccessDecision::Allowed,
            Err(e) => AccessDecision::Denied(e.to_string()),
        }
    }
}

/// Check a declaration without building a guard
pub fn validate_declaration(
    module: Option<&str>,
    permissions: &[String],
) -> Result<(), GuardConfigError> {
    if permissions.is_empty() {
        return Ok(());
    }

    let Some(module) = module.filter(|m| !m.is_empty()) else {
        return Err(GuardConfigError::MissingModule {
            permissions: permissions.to_vec(),
        });
    };

    let foreign: Vec<String> = permissions
        .iter()
        .filter(|p| !belongs_to_module(p, module))
        .cloned()
        .collect();
    if !foreign.is_empty() {
        return Err(GuardConfigError::ForeignPermissions {
            module: module.to_string(),
            permissions: foreign,
        });
    }

    Ok(())
}

/// Per-route permission requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePermissionGuard {
    module: Option<String>,
    permissions: Vec<String>,
}

impl ModulePermissionGuard {
    /// A guard that allows every request
    pub fn open() -> Self {
        Self {
            module: None,
            permissions: Vec::new(),
        }
    }

    /// Require any of `permissions` within `module`
    pub fn new<I, P>(module: &str, permissions: I) -> Result<Self, GuardConfigError>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self::from_declaration(Some(module), permissions)
    }

    /// Build a guard from a possibly incomplete declaration
    pub fn from_declaration<I, P>(
        module: Option<&str>,
        permissions: I,
    ) -> Result<Self, GuardConfigError>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let permissions: Vec<String> = permissions.into_iter().map(Into::into).collect();
        validate_declaration(module, &permissions)?;

        Ok(Self {
            module: module.filter(|m| !m.is_empty()).map(str::to_string),
            permissions,
        })
    }

    /// Require any of `permissions` within the CRM module
    pub fn crm<I, P>(permissions: I) -> Result<Self, GuardConfigError>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self::new(CRM, permissions)
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn is_open(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Decide whether `user` may pass.
    ///
    /// Never mutates state. A storage failure is returned as
    /// `GuardError::Unavailable` and must be treated as a denial.
    pub async fn authorize(
        &self,
        resolver: &PermissionResolver,
        user: Option<&UserContext>,
    ) -> Result<(), GuardError> {
        if self.is_open() {
            return Ok(());
        }

        let Some(module) = self.module.as_deref() else {
            // Unreachable through the constructors, kept as a hard failure
            let err = GuardConfigError::MissingModule {
                permissions: self.permissions.clone(),
            };
            error!(error = %err, "Guard misconfigured");
            return Err(err.into());
        };

        let Some(user) = user else {
            debug!(module, "Denied: no authenticated user");
            return Err(GuardError::Unauthenticated);
        };

        let held = resolver.resolve(user.id, module).await.map_err(|e| {
            error!(user_id = %user.id, module, error = %e, "Permission resolution failed, denying");
            GuardError::Unavailable(e)
        })?;

        if held.is_empty() {
            info!(user_id = %user.id, module, "Denied: user has no roles in module");
            return Err(GuardError::no_roles(module));
        }

        match self.permissions.iter().find(|p| held.contains(p.as_str())) {
            Some(matched) => {
                debug!(user_id = %user.id, module, permission = %matched, "Allowed");
                Ok(())
            }
            None => {
                info!(
                    user_id = %user.id,
                    module,
                    required = ?self.permissions,
                    "Denied: missing required permissions"
                );
                Err(GuardError::lacks_permissions(module, &self.permissions))
            }
        }
    }
}

/// One-shot form of the guard: validate the declaration, then decide
pub async fn authorize(
    resolver: &PermissionResolver,
    user: Option<&UserContext>,
    module: Option<&str>,
    required: &[String],
) -> Result<(), GuardError> {
    let guard = ModulePermissionGuard::from_declaration(module, required.iter().cloned())
        .inspect_err(|e| error!(error = %e, "Guard misconfigured"))?;
    guard.authorize(resolver, user).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::types::{ModuleDef, PermissionDef, RoleDef};
    use crate::access_control::CatalogProvisioner;
    use crate::store::{MemoryStore, UserStore};
    use std::sync::Arc;

    /// Module X with permissions x.a, x.b, x.c and a role granting {x.a, x.b}
    async fn fixture() -> (PermissionResolver, UserContext, UserContext) {
        let store = Arc::new(MemoryStore::new());
        let provisioner = CatalogProvisioner::new(store.clone(), store.clone());
        provisioner
            .provision(&ModuleDef {
                name: "X".into(),
                description: None,
                permissions: vec![
                    PermissionDef::new("x.a", "a"),
                    PermissionDef::new("x.b", "b"),
                    PermissionDef::new("x.c", "c"),
                ],
                roles: vec![RoleDef {
                    name: "AB".into(),
                    description: None,
                    permissions: vec!["x.a".into(), "x.b".into()],
                }],
            })
            .await
            .unwrap();

        let holder = store.create_user("holder@example.com", false).await.unwrap();
        provisioner.assign_role(holder.id, "X", "AB").await.unwrap();
        let outsider = store.create_user("outsider@example.com", true).await.unwrap();

        (
            PermissionResolver::new(store),
            UserContext::from(&holder),
            UserContext::from(&outsider),
        )
    }

    #[tokio::test]
    async fn test_or_semantics() {
        let (resolver, holder, _) = fixture().await;

        for required in [vec!["x.a"], vec!["x.b"], vec!["x.a", "x.c"], vec!["x.c", "x.b"]] {
            let guard = ModulePermissionGuard::new("X", required.clone()).unwrap();
            assert!(
                guard.authorize(&resolver, Some(&holder)).await.is_ok(),
                "{:?} should be allowed",
                required
            );
        }

        let guard = ModulePermissionGuard::new("X", ["x.c"]).unwrap();
        let err = guard.authorize(&resolver, Some(&holder)).await.unwrap_err();
        assert!(matches!(err, GuardError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_no_roles_denies_even_supervisor() {
        let (resolver, _, outsider) = fixture().await;
        let guard = ModulePermissionGuard::new("X", ["x.a"]).unwrap();

        let err = guard.authorize(&resolver, Some(&outsider)).await.unwrap_err();
        assert_eq!(err, GuardError::no_roles("X"));
    }

    #[tokio::test]
    async fn test_unauthenticated() {
        let (resolver, _, _) = fixture().await;
        let guard = ModulePermissionGuard::new("X", ["x.a"]).unwrap();

        let err = guard.authorize(&resolver, None).await.unwrap_err();
        assert_eq!(err, GuardError::Unauthenticated);
    }

    #[tokio::test]
    async fn test_empty_requirement_allows_anonymous() {
        let (resolver, _, _) = fixture().await;
        let guard = ModulePermissionGuard::from_declaration(None, Vec::<String>::new()).unwrap();

        assert!(guard.is_open());
        assert!(guard.authorize(&resolver, None).await.is_ok());
    }

    #[test]
    fn test_foreign_permission_fails_at_construction() {
        let err = ModulePermissionGuard::new("CRM", ["pm.read"]).unwrap_err();
        assert_eq!(
            err,
            GuardConfigError::ForeignPermissions {
                module: "CRM".into(),
                permissions: vec!["pm.read".into()],
            }
        );
    }

    #[test]
    fn test_missing_module_fails_at_construction() {
        let err = ModulePermissionGuard::from_declaration(None, ["crm.lead.read"]).unwrap_err();
        assert!(matches!(err, GuardConfigError::MissingModule { .. }));

        let err = ModulePermissionGuard::from_declaration(Some(""), ["crm.lead.read"]).unwrap_err();
        assert!(matches!(err, GuardConfigError::MissingModule { .. }));
    }

    #[test]
    fn test_module_prefix_is_case_insensitive_on_module() {
        assert!(ModulePermissionGuard::new("crm", ["crm.lead.read"]).is_ok());
        assert!(ModulePermissionGuard::crm(["crm.deal.update", "crm.deal.change_stage"]).is_ok());
    }

    #[tokio::test]
    async fn test_free_authorize_reports_configuration_error() {
        let (resolver, holder, _) = fixture().await;
        let err = authorize(&resolver, Some(&holder), Some("X"), &["pm.read".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }

    #[test]
    fn test_access_decision_from_result() {
        assert!(AccessDecision::from(&Ok(())).is_allowed());
        let denied = AccessDecision::from(&Err(GuardError::Unauthenticated));
        assert!(denied.is_denied());
    }
}
