//! HTTP API
//!
//! Builds the axum router. Every request first passes the authentication
//! middleware, which attaches the caller (if any); guarded routes then run
//! their [`RequirePermissionsLayer`] before the handler.

pub mod authz;
pub mod crm;
pub mod roles;
pub mod users;
pub mod workspaces;

use crate::access_control::{
    CatalogProvisioner, ModulePermissionGuard, PermissionResolver, RequirePermissionsLayer,
};
use crate::auth::{SharedAuthenticator, authenticate_request};
use crate::error::GuardConfigError;
use crate::membership::{MembershipEngine, SupervisorBypass, UserDirectory};
use crate::metrics::{AuthzMetrics, MetricsSnapshot};
use crate::store::Stores;
use axum::http::{HeaderName, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: MembershipEngine,
    pub users: UserDirectory,
    pub catalog: CatalogProvisioner,
    pub resolver: PermissionResolver,
    pub metrics: Arc<AuthzMetrics>,
    pub server_name: Arc<str>,
}

impl AppState {
    pub fn new(
        stores: &Stores,
        policy: SupervisorBypass,
        metrics: Arc<AuthzMetrics>,
        server_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            engine: MembershipEngine::new(stores.memberships.clone(), stores.users.clone(), policy)
                .with_metrics(metrics.clone()),
            users: UserDirectory::new(stores.users.clone(), stores.memberships.clone())
                .with_metrics(metrics.clone()),
            catalog: CatalogProvisioner::new(stores.roles.clone(), stores.users.clone()),
            resolver: PermissionResolver::new(stores.roles.clone()),
            metrics,
            server_name: server_name.into(),
        }
    }

    /// Layer enforcing `guard` with this state's resolver and metrics
    pub fn guard_layer(&self, guard: ModulePermissionGuard) -> RequirePermissionsLayer {
        RequirePermissionsLayer::new(guard, self.resolver.clone(), self.metrics.clone())
    }
}

/// Build the full application router.
///
/// Fails if any route's permission declaration is malformed.
pub fn router(
    state: AppState,
    authenticator: SharedAuthenticator,
    cors_origins: &[String],
) -> Result<Router, GuardConfigError> {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(authz::router())
        .merge(users::router())
        .merge(workspaces::router())
        .merge(roles::router())
        .merge(crm::router(&state)?)
        .layer(from_fn_with_state(authenticator, authenticate_request))
        .layer(TraceLayer::new_for_http());

    if !cors_origins.is_empty() {
        app = app.layer(build_cors_layer(cors_origins));
    }

    Ok(app.with_state(state))
}

/// Build a CORS layer from the configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.len() == 1 && origins[0] == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ])
        .max_age(Duration::from_secs(3600))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": &*state.server_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
