//! Role graph administration endpoints; supervisors only

use crate::access_control::{Module, Permission, RoleGrants};
use crate::api::AppState;
use crate::auth::{CurrentUser, UserContext};
use crate::error::CatalogError;
use crate::error::http_mapper::ApiError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/modules", get(list_modules))
        .route("/modules/{module}/permissions", get(list_permissions))
        .route("/modules/{module}/roles", get(list_roles))
        .route("/modules/{module}/roles/{role}", delete(delete_role))
        .route("/modules/{module}/roles/{role}/permissions", post(grant))
        .route("/modules/{module}/roles/{role}/users", post(assign))
        .route(
            "/modules/{module}/roles/{role}/users/{user_id}",
            delete(revoke),
        )
}

fn require_supervisor(actor: &UserContext) -> Result<(), CatalogError> {
    if actor.is_supervisor {
        Ok(())
    } else {
        Err(CatalogError::Forbidden("roles".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct Assignment {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct Grant {
    pub permission: String,
}

async fn list_modules(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<Module>>, ApiError> {
    require_supervisor(&actor)?;
    Ok(Json(state.catalog.modules().await?))
}

async fn list_permissions(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(module): Path<String>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    require_supervisor(&actor)?;
    Ok(Json(state.catalog.permissions(&module).await?))
}

async fn list_roles(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(module): Path<String>,
) -> Result<Json<Vec<RoleGrants>>, ApiError> {
    require_supervisor(&actor)?;
    Ok(Json(state.catalog.roles_with_grants(&module).await?))
}

async fn delete_role(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((module, role)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    require_supervisor(&actor)?;
    state.catalog.delete_role(&module, &role).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn grant(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((module, role)): Path<(String, String)>,
    Json(body): Json<Grant>,
) -> Result<StatusCode, ApiError> {
    require_supervisor(&actor)?;
    state.catalog.grant(&module, &role, &body.permission).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((module, role)): Path<(String, String)>,
    Json(body): Json<Assignment>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_supervisor(&actor)?;
    let assigned = state
        .catalog
        .assign_role(body.user_id, &module, &role)
        .await?;
    let status = if assigned {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "assigned": assigned }))))
}

async fn revoke(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((module, role, user_id)): Path<(String, String, Uuid)>,
) -> Result<Json<Value>, ApiError> {
    require_supervisor(&actor)?;
    let revoked = state.catalog.revoke_role(user_id, &module, &role).await?;
    Ok(Json(json!({ "revoked": revoked })))
}
