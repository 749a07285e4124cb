//! Error types for crm-access
//!
//! This module defines the error hierarchy used throughout the application.
//! We use `thiserror` for library-style errors that are part of the API,
//! and convert to HTTP responses at the boundary (see [`http_mapper`]).

pub mod http_mapper;

use thiserror::Error;
use uuid::Uuid;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Authorization error: {0}")]
    Guard(#[from] GuardError),

    #[error("Membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid permission name '{name}': {reason}")]
    InvalidPermission { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a storage collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Dangling reference to {entity} {key}")]
    MissingReference { entity: &'static str, key: String },

    #[error("Transaction conflict: {0}")]
    Conflict(String),
}

/// Errors raised while provisioning the role graph
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid permission name '{name}': {reason}")]
    InvalidPermission { name: String, reason: String },

    #[error("Permission '{permission}' belongs to module '{permission_module}', not '{role_module}'")]
    CrossModuleGrant {
        permission: String,
        permission_module: String,
        role_module: String,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("Only supervisors can manage {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// A route's permission declaration is malformed.
///
/// These are server bugs, not client mistakes, and map to a 5xx response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardConfigError {
    #[error("Module must be specified when requiring permissions: {}", .permissions.join(", "))]
    MissingModule { permissions: Vec<String> },

    #[error("Invalid permissions for {module} module: {}", .permissions.join(", "))]
    ForeignPermissions {
        module: String,
        permissions: Vec<String>,
    },
}

/// Request-time authorization failures from the module permission guard
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("No authenticated user on request")]
    Unauthenticated,

    #[error("Guard misconfigured: {0}")]
    Configuration(#[from] GuardConfigError),

    #[error("Forbidden in module {module}: {reason}")]
    Forbidden { module: String, reason: String },

    #[error("Permission resolution failed: {0}")]
    Unavailable(#[from] StoreError),
}

impl GuardError {
    pub fn no_roles(module: impl Into<String>) -> Self {
        let module = module.into();
        Self::Forbidden {
            reason: format!("user has no {} roles assigned", module),
            module,
        }
    }

    pub fn lacks_permissions(module: impl Into<String>, required: &[String]) -> Self {
        let module = module.into();
        Self::Forbidden {
            reason: format!(
                "user lacks required {} permissions: {}",
                module,
                required.join(", ")
            ),
            module,
        }
    }

    /// Short machine-readable kind, used for metrics and response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::Unauthenticated => "Unauthenticated",
            GuardError::Configuration(_) => "ConfigurationError",
            GuardError::Forbidden { .. } => "Forbidden",
            GuardError::Unavailable(_) => "Unavailable",
        }
    }
}

/// Workspace membership errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("Workspace {0} not found")]
    WorkspaceNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("User {user_id} is not a member of workspace {workspace_id}")]
    NotMember { workspace_id: Uuid, user_id: Uuid },

    #[error("User {user_id} is already a member of workspace {workspace_id}")]
    AlreadyMember { workspace_id: Uuid, user_id: Uuid },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl MembershipError {
    pub fn admins_only(action: &str) -> Self {
        Self::Forbidden(format!("only workspace admins can {}", action))
    }

    pub fn last_admin(action: &str) -> Self {
        Self::InvariantViolation(format!(
            "cannot {} the last admin of the workspace",
            action
        ))
    }

    pub fn no_admin() -> Self {
        Self::InvariantViolation(
            "a workspace without admins can only gain an admin member".to_string(),
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MembershipError::WorkspaceNotFound(_)
            | MembershipError::UserNotFound(_)
            | MembershipError::NotMember { .. } => "NotFound",
            MembershipError::AlreadyMember { .. } => "Conflict",
            MembershipError::Forbidden(_) => "Forbidden",
            MembershipError::InvariantViolation(_) => "InvariantViolation",
            MembershipError::Invalid(_) => "InvalidRequest",
            MembershipError::Store(_) => "StorageError",
        }
    }
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No authentication configured")]
    NotConfigured,

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Unknown credentials")]
    UnknownCredentials,

    #[error("Authentication failed: {0}")]
    Failed(String),
}

impl AuthError {
    /// The credential was looked at and turned down, as opposed to the
    /// lookup itself failing
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AuthError::Failed(_))
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for membership operations
pub type MembershipResult<T> = std::result::Result<T, MembershipError>;
