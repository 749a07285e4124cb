//! Workspace and membership endpoints
//!
//! Thin wrappers over [`MembershipEngine`](crate::membership::MembershipEngine);
//! every rule lives in the engine.

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::error::http_mapper::ApiError;
use crate::membership::{
    Membership, NewMember, UserWorkspace, Workspace, WorkspaceChanges, WorkspaceMember,
    WorkspaceRole,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workspaces", post(create).get(list_all))
        .route("/workspaces/mine", get(list_mine))
        .route(
            "/workspaces/{id}",
            get(get_workspace).patch(update).delete(delete_workspace),
        )
        .route("/workspaces/{id}/members", get(list_members).post(add_member))
        .route("/workspaces/{id}/members/bulk", post(add_members))
        .route("/workspaces/{id}/members/{user_id}", delete(remove_member))
        .route("/workspaces/{id}/members/{user_id}/role", patch(change_role))
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkspace {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkMembers {
    pub members: Vec<NewMember>,
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: WorkspaceRole,
}

async fn create(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(body): Json<CreateWorkspace>,
) -> Result<(StatusCode, Json<Workspace>), ApiError> {
    let workspace = state
        .engine
        .create_workspace(&actor, &body.name, body.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn list_all(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<Workspace>>, ApiError> {
    Ok(Json(state.engine.list_all_workspaces(&actor).await?))
}

async fn list_mine(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<UserWorkspace>>, ApiError> {
    Ok(Json(state.engine.list_my_workspaces(&actor).await?))
}

async fn get_workspace(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Workspace>, ApiError> {
    Ok(Json(state.engine.get_workspace(&actor, id).await?))
}

async fn update(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<WorkspaceChanges>,
) -> Result<Json<Workspace>, ApiError> {
    Ok(Json(state.engine.update_workspace(&actor, id, &changes).await?))
}

async fn delete_workspace(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_workspace(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_members(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WorkspaceMember>>, ApiError> {
    Ok(Json(state.engine.list_members(&actor, id).await?))
}

async fn add_member(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(new): Json<NewMember>,
) -> Result<(StatusCode, Json<Membership>), ApiError> {
    let membership = state.engine.add_member(&actor, id, new).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

async fn add_members(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<BulkMembers>,
) -> Result<(StatusCode, Json<Vec<Membership>>), ApiError> {
    let added = state.engine.add_members(&actor, id, body.members).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state.engine.remove_member(&actor, id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_role(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RoleChange>,
) -> Result<Json<Membership>, ApiError> {
    Ok(Json(
        state
            .engine
            .change_role(&actor, id, user_id, body.role)
            .await?,
    ))
}
