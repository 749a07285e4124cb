//! Route-level enforcement of a [`ModulePermissionGuard`]
//!
//! ```ignore
//! Router::new()
//!     .route("/crm/roles", get(list_roles))
//!     .route_layer(RequirePermissionsLayer::new(
//!         ModulePermissionGuard::crm(["crm.settings.manage"])?,
//!         resolver.clone(),
//!         metrics.clone(),
//!     ))
//! ```
//!
//! The layer reads the [`UserContext`] that the authentication middleware
//! placed in the request extensions. A denied request never reaches the
//! inner service.

use crate::access_control::guard::ModulePermissionGuard;
use crate::access_control::resolver::PermissionResolver;
use crate::auth::UserContext;
use crate::error::http_mapper::map_guard_error;
use crate::metrics::AuthzMetrics;
use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer guarding every route it wraps with one declaration
#[derive(Clone)]
pub struct RequirePermissionsLayer {
    guard: Arc<ModulePermissionGuard>,
    resolver: PermissionResolver,
    metrics: Arc<AuthzMetrics>,
}

impl RequirePermissionsLayer {
    pub fn new(
        guard: ModulePermissionGuard,
        resolver: PermissionResolver,
        metrics: Arc<AuthzMetrics>,
    ) -> Self {
        Self {
            guard: Arc::new(guard),
            resolver,
            metrics,
        }
    }

    pub fn guard(&self) -> &ModulePermissionGuard {
        &self.guard
    }
}

impl<S> Layer<S> for RequirePermissionsLayer {
    type Service = RequirePermissions<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermissions {
            inner,
            guard: self.guard.clone(),
            resolver: self.resolver.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Service wrapper for [`RequirePermissionsLayer`]
#[derive(Clone)]
pub struct RequirePermissions<S> {
    inner: S,
    guard: Arc<ModulePermissionGuard>,
    resolver: PermissionResolver,
    metrics: Arc<AuthzMetrics>,
}

impl<S> Service<Request<Body>> for RequirePermissions<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let guard = self.guard.clone();
        let resolver = self.resolver.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            let user = req.extensions().get::<UserContext>().cloned();
            let outcome = guard.authorize(&resolver, user.as_ref()).await;
            metrics.record_guard(&guard, user.as_ref(), &outcome);

            match outcome {
                Ok(()) => inner.call(req).await,
                Err(e) => Ok(map_guard_error(&e).into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::catalog::{CRM, CatalogProvisioner, crm_module};
    use crate::store::{MemoryStore, UserStore};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn app() -> (Router, UserContext, UserContext, Arc<AuthzMetrics>) {
        let store = Arc::new(MemoryStore::new());
        let provisioner = CatalogProvisioner::new(store.clone(), store.clone());
        provisioner.provision(&crm_module()).await.unwrap();
        let viewer = store.create_user("viewer@example.com", false).await.unwrap();
        provisioner.assign_role(viewer.id, CRM, "CRM Viewer").await.unwrap();
        let admin = store.create_user("admin@example.com", false).await.unwrap();
        provisioner.assign_role(admin.id, CRM, "CRM Admin").await.unwrap();

        let metrics = Arc::new(AuthzMetrics::new());
        let layer = RequirePermissionsLayer::new(
            ModulePermissionGuard::crm(["crm.lead.delete"]).unwrap(),
            PermissionResolver::new(store),
            metrics.clone(),
        );
        let router = Router::new()
            .route("/leads/{id}", get(|| async { "deleted" }))
            .route_layer(layer);

        (
            router,
            UserContext::from(&viewer),
            UserContext::from(&admin),
            metrics,
        )
    }

    fn request(user: Option<&UserContext>) -> Request<Body> {
        let mut req = Request::builder()
            .uri("/leads/1")
            .body(Body::empty())
            .unwrap();
        if let Some(user) = user {
            req.extensions_mut().insert(user.clone());
        }
        req
    }

    #[tokio::test]
    async fn test_layer_allows_permitted_user() {
        let (router, _, admin, metrics) = app().await;
        let response = router.oneshot(request(Some(&admin))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.snapshot().allowed, 1);
    }

    #[tokio::test]
    async fn test_layer_forbids_user_without_permission() {
        let (router, viewer, _, metrics) = app().await;
        let response = router.oneshot(request(Some(&viewer))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(metrics.snapshot().forbidden, 1);
    }

    #[tokio::test]
    async fn test_layer_rejects_anonymous() {
        let (router, _, _, metrics) = app().await;
        let response = router.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(metrics.snapshot().unauthenticated, 1);
    }
}
