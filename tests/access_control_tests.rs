//! Module-scoped RBAC integration tests
//!
//! Exercises the resolver and guard against the built-in CRM catalog plus a
//! second module, through the public crate API only.

use crm_access::access_control::{
    CRM, CatalogProvisioner, ModuleDef, ModulePermissionGuard, PermissionDef,
    PermissionResolver, RoleDef, authorize, crm_module,
};
use crm_access::auth::UserContext;
use crm_access::error::{GuardConfigError, GuardError};
use crm_access::store::{MemoryStore, UserStore};
use rstest::rstest;
use std::sync::Arc;

// =============================================================================
// Test Helpers
// =============================================================================

struct Catalog {
    provisioner: CatalogProvisioner,
    resolver: PermissionResolver,
    store: Arc<MemoryStore>,
}

impl Catalog {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let provisioner = CatalogProvisioner::new(store.clone(), store.clone());
        provisioner.provision(&crm_module()).await.unwrap();
        provisioner.provision(&pm_module()).await.unwrap();
        Self {
            provisioner,
            resolver: PermissionResolver::new(store.clone()),
            store,
        }
    }

    async fn user_with(&self, email: &str, module: &str, role: &str) -> UserContext {
        let user = self.store.create_user(email, false).await.unwrap();
        self.provisioner
            .assign_role(user.id, module, role)
            .await
            .unwrap();
        UserContext::from(&user)
    }

    async fn check(&self, user: &UserContext, module: &str, required: &[&str]) -> bool {
        let guard = ModulePermissionGuard::new(module, required.iter().copied()).unwrap();
        guard.authorize(&self.resolver, Some(user)).await.is_ok()
    }
}

fn pm_module() -> ModuleDef {
    ModuleDef {
        name: "PM".into(),
        description: Some("Project management".into()),
        permissions: vec![
            PermissionDef::new("pm.task.read", "View tasks"),
            PermissionDef::new("pm.task.update", "Update tasks"),
        ],
        roles: vec![RoleDef {
            name: "PM Viewer".into(),
            description: None,
            permissions: vec!["pm.task.read".into()],
        }],
    }
}

// =============================================================================
// Resolution
// =============================================================================

mod resolution {
    use super::*;

    #[tokio::test]
    async fn test_no_roles_resolves_empty_and_denies() {
        let catalog = Catalog::new().await;
        let user = catalog.store.create_user("nobody@example.com", false).await.unwrap();
        let ctx = UserContext::from(&user);

        assert!(catalog.resolver.resolve(user.id, CRM).await.unwrap().is_empty());
        let err = ModulePermissionGuard::crm(["crm.lead.read"])
            .unwrap()
            .authorize(&catalog.resolver, Some(&ctx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Forbidden");
        assert!(err.to_string().contains("no CRM roles"));
    }

    #[tokio::test]
    async fn test_roles_do_not_leak_across_modules() {
        let catalog = Catalog::new().await;
        let admin = catalog.user_with("admin@example.com", CRM, "CRM Admin").await;

        assert!(catalog.resolver.resolve(admin.id, "PM").await.unwrap().is_empty());
        assert!(!catalog.check(&admin, "PM", &["pm.task.read"]).await);
    }

    #[tokio::test]
    async fn test_role_graph_changes_visible_on_next_call() {
        let catalog = Catalog::new().await;
        let viewer = catalog.user_with("v@example.com", CRM, "CRM Viewer").await;
        assert!(!catalog.check(&viewer, CRM, &["crm.reports.view"]).await);

        catalog
            .provisioner
            .grant(CRM, "CRM Viewer", "crm.reports.view")
            .await
            .unwrap();
        assert!(catalog.check(&viewer, CRM, &["crm.reports.view"]).await);

        catalog
            .provisioner
            .revoke_role(viewer.id, CRM, "CRM Viewer")
            .await
            .unwrap();
        assert!(!catalog.check(&viewer, CRM, &["crm.lead.read"]).await);
    }

    #[tokio::test]
    async fn test_union_of_multiple_roles() {
        let catalog = Catalog::new().await;
        let user = catalog.user_with("u@example.com", "PM", "PM Viewer").await;
        catalog
            .provisioner
            .assign_role(user.id, CRM, "CRM Viewer")
            .await
            .unwrap();
        catalog
            .provisioner
            .assign_role(user.id, CRM, "Sales Representative")
            .await
            .unwrap();

        let held = catalog.resolver.resolve(user.id, CRM).await.unwrap();
        // Viewer-only and rep-only permissions both present
        assert!(held.contains("crm.project.read"));
        assert!(held.contains("crm.lead.create"));
        assert!(held.iter().all(|p| p.starts_with("crm.")));
    }

    #[tokio::test]
    async fn test_deleted_role_stops_granting() {
        let catalog = Catalog::new().await;
        let user = catalog.user_with("u@example.com", "PM", "PM Viewer").await;
        assert!(catalog.check(&user, "PM", &["pm.task.read"]).await);

        catalog.provisioner.delete_role("PM", "PM Viewer").await.unwrap();
        assert!(catalog.resolver.resolve(user.id, "PM").await.unwrap().is_empty());
    }
}

// =============================================================================
// OR semantics
// =============================================================================

mod any_of {
    use super::*;

    // Sales Representative holds crm.deal.update but not crm.deal.delete
    #[rstest]
    #[case(&["crm.deal.update"], true)]
    #[case(&["crm.deal.change_stage"], true)]
    #[case(&["crm.deal.update", "crm.deal.delete"], true)]
    #[case(&["crm.deal.delete", "crm.deal.update"], true)]
    #[case(&["crm.deal.delete"], false)]
    #[case(&["crm.deal.delete", "crm.settings.manage"], false)]
    #[tokio::test]
    async fn test_any_required_permission_suffices(
        #[case] required: &[&str],
        #[case] allowed: bool,
    ) {
        let catalog = Catalog::new().await;
        let rep = catalog
            .user_with("rep@example.com", CRM, "Sales Representative")
            .await;
        assert_eq!(catalog.check(&rep, CRM, required).await, allowed);
    }

    #[rstest]
    #[case("CRM Admin", true)]
    #[case("Sales Manager", false)]
    #[case("Sales Representative", false)]
    #[case("CRM Viewer", false)]
    #[tokio::test]
    async fn test_settings_manage_only_for_admin(#[case] role: &str, #[case] allowed: bool) {
        let catalog = Catalog::new().await;
        let user = catalog.user_with("u@example.com", CRM, role).await;
        assert_eq!(
            catalog.check(&user, CRM, &["crm.settings.manage"]).await,
            allowed
        );
    }

    #[rstest]
    #[case("CRM Admin")]
    #[case("Sales Manager")]
    #[case("Sales Representative")]
    #[case("CRM Viewer")]
    #[tokio::test]
    async fn test_dashboard_or_settings_open_to_every_builtin_role(#[case] role: &str) {
        let catalog = Catalog::new().await;
        let user = catalog.user_with("u@example.com", CRM, role).await;
        assert!(
            catalog
                .check(&user, CRM, &["crm.settings.manage", "crm.dashboard.view"])
                .await
        );
    }
}

// =============================================================================
// Declarations
// =============================================================================

mod declarations {
    use super::*;

    #[test]
    fn test_foreign_permission_rejected_at_construction() {
        let err = ModulePermissionGuard::crm(["pm.read"]).unwrap_err();
        assert!(matches!(err, GuardConfigError::ForeignPermissions { .. }));
    }

    #[test]
    fn test_missing_module_rejected_at_construction() {
        let err = ModulePermissionGuard::from_declaration(None, ["crm.lead.read"]).unwrap_err();
        assert!(matches!(err, GuardConfigError::MissingModule { .. }));
    }

    #[tokio::test]
    async fn test_empty_requirements_allow_anonymous() {
        let catalog = Catalog::new().await;
        assert!(
            authorize(&catalog.resolver, None, None, &[])
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_anonymous_denied_before_resolution() {
        let catalog = Catalog::new().await;
        let err = authorize(
            &catalog.resolver,
            None,
            Some(CRM),
            &["crm.lead.read".to_string()],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GuardError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_configuration_error_wins_over_missing_user() {
        let catalog = Catalog::new().await;
        let err = authorize(&catalog.resolver, None, Some(CRM), &["pm.task.read".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[tokio::test]
    async fn test_supervisor_flag_does_not_bypass_rbac() {
        let catalog = Catalog::new().await;
        let user = catalog.store.create_user("sup@example.com", true).await.unwrap();
        let ctx = UserContext::from(&user);
        assert!(ctx.is_supervisor);
        assert!(!catalog.check(&ctx, CRM, &["crm.lead.read"]).await);
    }
}
