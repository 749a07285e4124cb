//! Ad-hoc permission checks and the caller's own view

use crate::access_control::{AccessDecision, authorize};
use crate::api::AppState;
use crate::auth::{CurrentUser, UserContext};
use crate::error::GuardError;
use crate::error::http_mapper::{ApiError, bad_request};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/authz/check", post(check))
        .route("/me", get(me))
        .route("/me/permissions/{module}", get(my_permissions))
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub module: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
}

/// Evaluate a `(module, permissions)` declaration for the caller.
///
/// A malformed declaration is the caller's mistake here, so it is a 400
/// rather than the 500 a misdeclared route produces.
async fn check(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let user = user.map(|CurrentUser(u)| u);
    let outcome = authorize(
        &state.resolver,
        user.as_ref(),
        request.module.as_deref(),
        &request.permissions,
    )
    .await;

    if let Err(GuardError::Configuration(e)) = &outcome {
        return Err(bad_request(e.to_string()).with("error_type", "ConfigurationError"));
    }

    state.metrics.record_decision(
        request.module.as_deref(),
        &request.permissions,
        user.as_ref(),
        &outcome,
    );

    let response = match AccessDecision::from(&outcome) {
        AccessDecision::Allowed => CheckResponse {
            allowed: true,
            reason: None,
            error_type: None,
        },
        AccessDecision::Denied(reason) => CheckResponse {
            allowed: false,
            reason: Some(reason),
            error_type: outcome.as_ref().err().map(GuardError::kind),
        },
    };
    Ok(Json(response))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserContext> {
    Json(user)
}

#[derive(Debug, Serialize)]
pub struct ModulePermissions {
    pub module: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

async fn my_permissions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(module): Path<String>,
) -> Result<Json<ModulePermissions>, ApiError> {
    let roles = state.resolver.roles(user.id, &module).await?;
    let permissions = state.resolver.resolve(user.id, &module).await?;

    Ok(Json(ModulePermissions {
        module,
        roles: roles.into_iter().map(|r| r.name).collect(),
        permissions: permissions.into_iter().collect(),
    }))
}
