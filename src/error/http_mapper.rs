//! HTTP error mapping.
//!
//! Maps application errors to HTTP status codes and JSON bodies.
//!
//! # Strategy
//! - Misconfigured route guards → 500, they are server bugs
//! - Storage failures → 503, the request was denied rather than allowed
//! - Everything else → a distinct 4xx per error kind
//!
//! Every body has the shape `{"error": <message>, "error_type": <kind>, ...}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use super::{CatalogError, GuardError, MembershipError, StoreError};

/// An error ready to be written as an HTTP response
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({
                "error": message.into(),
                "error_type": error_type,
            }),
        }
    }

    /// Attach an extra field to the body
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Some(obj) = self.body.as_object_mut() {
            obj.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn error_type(&self) -> &str {
        self.body["error_type"].as_str().unwrap_or("Unknown")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Maps a `GuardError` to an HTTP error.
pub fn map_guard_error(error: &GuardError) -> ApiError {
    match error {
        GuardError::Unauthenticated => ApiError::new(
            StatusCode::UNAUTHORIZED,
            error.kind(),
            "authentication required",
        ),

        GuardError::Configuration(cfg) => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error.kind(), cfg.to_string())
        }

        GuardError::Forbidden { module, reason } => {
            ApiError::new(StatusCode::FORBIDDEN, error.kind(), reason.clone())
                .with("module", module.clone())
        }

        GuardError::Unavailable(store) => map_store_error(store),
    }
}

/// Maps a `MembershipError` to an HTTP error.
pub fn map_membership_error(error: &MembershipError) -> ApiError {
    let status = match error {
        MembershipError::WorkspaceNotFound(_)
        | MembershipError::UserNotFound(_)
        | MembershipError::NotMember { .. } => StatusCode::NOT_FOUND,
        MembershipError::AlreadyMember { .. } => StatusCode::CONFLICT,
        MembershipError::Forbidden(_) => StatusCode::FORBIDDEN,
        MembershipError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MembershipError::Invalid(_) => StatusCode::BAD_REQUEST,
        MembershipError::Store(store) => return map_store_error(store),
    };
    ApiError::new(status, error.kind(), error.to_string())
}

/// Maps a `CatalogError` to an HTTP error.
pub fn map_catalog_error(error: &CatalogError) -> ApiError {
    match error {
        CatalogError::InvalidPermission { name, .. } => {
            ApiError::new(StatusCode::BAD_REQUEST, "InvalidPermission", error.to_string())
                .with("permission", name.clone())
        }
        CatalogError::CrossModuleGrant { permission, .. } => {
            ApiError::new(StatusCode::BAD_REQUEST, "CrossModuleGrant", error.to_string())
                .with("permission", permission.clone())
        }
        CatalogError::NotFound { .. } => {
            ApiError::new(StatusCode::NOT_FOUND, "NotFound", error.to_string())
        }
        CatalogError::Conflict { .. } => {
            ApiError::new(StatusCode::CONFLICT, "Conflict", error.to_string())
        }
        CatalogError::Forbidden(_) => {
            ApiError::new(StatusCode::FORBIDDEN, "Forbidden", error.to_string())
        }
        CatalogError::Store(store) => map_store_error(store),
    }
}

/// Maps a `StoreError` to an HTTP error.
pub fn map_store_error(error: &StoreError) -> ApiError {
    match error {
        StoreError::Duplicate { entity, key } => ApiError::new(
            StatusCode::CONFLICT,
            "Conflict",
            format!("{} already exists: {}", entity, key),
        ),
        _ => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "StorageError",
            error.to_string(),
        ),
    }
}

/// Creates an HTTP error for a malformed request body or path.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "InvalidRequest", message)
}

impl From<GuardError> for ApiError {
    fn from(error: GuardError) -> Self {
        map_guard_error(&error)
    }
}

impl From<MembershipError> for ApiError {
    fn from(error: MembershipError) -> Self {
        map_membership_error(&error)
    }
}

impl From<CatalogError> for ApiError {
    fn from(error: CatalogError) -> Self {
        map_catalog_error(&error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        map_store_error(&error)
    }
}
