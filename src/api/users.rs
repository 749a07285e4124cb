//! User administration endpoints

use crate::api::AppState;
use crate::auth::{CurrentUser, User};
use crate::error::http_mapper::ApiError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/{id}", get(get_user).delete(delete_user))
        .route("/users/{id}/supervisor", patch(set_supervisor))
}

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    #[serde(default)]
    pub is_supervisor: bool,
}

#[derive(Debug, Deserialize)]
pub struct SupervisorFlag {
    pub is_supervisor: bool,
}

async fn register(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(body): Json<RegisterUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .users
        .register(&actor, &body.email, body.is_supervisor)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.get(&actor, id).await?))
}

async fn set_supervisor(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SupervisorFlag>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(
        state
            .users
            .set_supervisor(&actor, id, body.is_supervisor)
            .await?,
    ))
}

async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.users.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
