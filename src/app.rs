//! Application assembly
//!
//! Wires configuration, storage, the permission catalog and authentication
//! into a ready-to-serve router.

use crate::api::{self, AppState};
use crate::auth::{SharedAuthenticator, StaticTokenAuthenticator};
use crate::config::AppConfig;
use crate::error::Result;
use crate::metrics::AuthzMetrics;
use crate::store::Stores;
use axum::Router;
use std::sync::Arc;
use tracing::{info, warn};

/// A fully provisioned application
pub struct App {
    pub state: AppState,
    pub router: Router,
}

/// Seed the role graph and the bootstrap supervisor
pub async fn provision(config: &AppConfig, state: &AppState) -> Result<()> {
    for def in config.catalog.module_defs() {
        let module = state.catalog.provision(&def).await?;
        info!(
            module = %module.name,
            permissions = def.permissions.len(),
            roles = def.roles.len(),
            "Provisioned module"
        );
    }

    if let Some(email) = &config.bootstrap.supervisor_email {
        let user = state.users.ensure_supervisor(email).await?;
        info!(user_id = %user.id, email = %user.email, "Bootstrap supervisor ready");
    }

    Ok(())
}

/// Build the application on `stores`
pub async fn build(config: &AppConfig, stores: Stores) -> Result<App> {
    let metrics = Arc::new(AuthzMetrics::new());
    let state = AppState::new(
        &stores,
        config.membership.supervisor_bypass,
        metrics,
        config.server.name.as_str(),
    );

    provision(config, &state).await?;

    let authenticator =
        StaticTokenAuthenticator::from_config(&config.bootstrap.tokens, stores.users.clone());
    if authenticator.is_empty() {
        warn!("No bearer tokens configured; every request is anonymous");
    }
    let authenticator: SharedAuthenticator = Arc::new(authenticator);

    let router = api::router(state.clone(), authenticator, &config.server.cors_origins)
        .map_err(crate::error::GuardError::from)?;

    Ok(App { state, router })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::CRM;
    use crate::config::load_config_from_str;
    use crate::store::UserStore;

    #[tokio::test]
    async fn provisioning_twice_is_idempotent() {
        let config = load_config_from_str(
            r#"
            [bootstrap]
            supervisor_email = "root@example.com"
            "#,
        )
        .unwrap();
        let stores = Stores::in_memory();
        let app = build(&config, stores.clone()).await.unwrap();

        let before = app.state.catalog.roles_with_grants(CRM).await.unwrap();
        provision(&config, &app.state).await.unwrap();
        let after = app.state.catalog.roles_with_grants(CRM).await.unwrap();
        assert_eq!(before, after);

        let root = stores
            .users
            .find_user_by_email("root@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(root.is_supervisor);
    }

    #[tokio::test]
    async fn builtin_catalog_can_be_disabled() {
        let config = load_config_from_str("[catalog]\nbuiltin = false\n").unwrap();
        let app = build(&config, Stores::in_memory()).await.unwrap();
        assert!(app.state.catalog.modules().await.unwrap().is_empty());
    }
}
