//! CRM routes
//!
//! [`CRM_ROUTES`] declares the permission requirement of every guarded CRM
//! domain route. Each entry is validated into a [`ModulePermissionGuard`]
//! when the router is built, so a typo in a permission name stops startup
//! instead of surfacing on the first request.

use crate::access_control::{CRM, ModulePermissionGuard, Permission, RoleGrants};
use crate::api::AppState;
use crate::error::GuardConfigError;
use crate::error::http_mapper::ApiError;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

/// Permission requirement of one HTTP route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDeclaration {
    pub method: &'static str,
    pub path: &'static str,
    pub module: Option<&'static str>,
    /// Any one of these grants access
    pub permissions: &'static [&'static str],
}

impl RouteDeclaration {
    pub fn guard(&self) -> Result<ModulePermissionGuard, GuardConfigError> {
        ModulePermissionGuard::from_declaration(self.module, self.permissions.iter().copied())
    }
}

const fn crm(
    method: &'static str,
    path: &'static str,
    permissions: &'static [&'static str],
) -> RouteDeclaration {
    RouteDeclaration {
        method,
        path,
        module: Some(CRM),
        permissions,
    }
}

pub const CRM_ROUTES: &[RouteDeclaration] = &[
    crm("POST", "/crm/leads", &["crm.lead.create"]),
    crm("GET", "/crm/leads", &["crm.lead.read"]),
    crm("GET", "/crm/leads/{id}", &["crm.lead.read"]),
    crm("PUT", "/crm/leads/{id}", &["crm.lead.update"]),
    crm("DELETE", "/crm/leads/{id}", &["crm.lead.delete"]),
    crm("POST", "/crm/leads/{id}/convert", &["crm.lead.convert"]),
    crm("POST", "/crm/deals", &["crm.deal.create"]),
    crm("GET", "/crm/deals/{id}", &["crm.deal.read"]),
    crm("PUT", "/crm/deals/{id}", &["crm.deal.update"]),
    crm(
        "PUT",
        "/crm/deals/{id}/stage",
        &["crm.deal.update", "crm.deal.change_stage"],
    ),
    crm("DELETE", "/crm/deals/{id}", &["crm.deal.delete"]),
    crm("POST", "/crm/statuses", &["crm.status.create"]),
    crm("GET", "/crm/statuses", &["crm.status.read"]),
    crm("GET", "/crm/statuses/type/{type}", &["crm.status.read"]),
    crm("GET", "/crm/statuses/{id}", &["crm.status.read"]),
    crm("PUT", "/crm/statuses/{id}", &["crm.status.update"]),
    crm("DELETE", "/crm/statuses/{id}", &["crm.status.delete"]),
    crm("POST", "/crm/tags", &["crm.tag.create"]),
    crm("GET", "/crm/tags", &["crm.tag.read"]),
    crm("GET", "/crm/tags/{id}", &["crm.tag.read"]),
    crm("PUT", "/crm/tags/{id}", &["crm.tag.update"]),
    crm("DELETE", "/crm/tags/{id}", &["crm.tag.delete"]),
    crm("POST", "/crm/tags/assign", &["crm.tag.assign"]),
    crm("POST", "/crm/tags/unassign", &["crm.tag.unassign"]),
];

/// Validate every entry of [`CRM_ROUTES`]
pub fn guards() -> Result<Vec<(RouteDeclaration, ModulePermissionGuard)>, GuardConfigError> {
    CRM_ROUTES
        .iter()
        .map(|route| route.guard().map(|guard| (*route, guard)))
        .collect()
}

pub fn router(state: &AppState) -> Result<Router<AppState>, GuardConfigError> {
    guards()?;

    let settings = Router::new()
        .route("/crm/roles", get(list_roles))
        .route("/crm/routes", get(list_routes))
        .route_layer(state.guard_layer(ModulePermissionGuard::crm(["crm.settings.manage"])?));

    let catalog = Router::new()
        .route("/crm/permissions", get(list_permissions))
        .route_layer(state.guard_layer(ModulePermissionGuard::crm([
            "crm.settings.manage",
            "crm.dashboard.view",
        ])?));

    Ok(settings.merge(catalog))
}

async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<RoleGrants>>, ApiError> {
    Ok(Json(state.catalog.roles_with_grants(CRM).await?))
}

async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(state.catalog.permissions(CRM).await?))
}

async fn list_routes() -> Json<&'static [RouteDeclaration]> {
    Json(CRM_ROUTES)
}
