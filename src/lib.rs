//! crm-access
//!
//! Authorization service for a CRM/workspace product.
//!
//! ## Features
//!
//! - **Module-scoped RBAC**: users hold roles per module, roles grant
//!   permissions, routes declare `(module, permissions)` and pass when the
//!   caller holds any one of them
//! - **Workspace membership** with ADMIN/MEMBER roles and the guarantee that
//!   every non-empty workspace keeps at least one admin
//! - **Supervisors** with a configurable bypass policy
//! - **Flexible configuration** via TOML files and environment variables
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! port = 20290
//!
//! [membership.supervisor_bypass]
//! remove_member = true
//!
//! [bootstrap]
//! supervisor_email = "root@example.com"
//! tokens = [{ token = "dev-token", email = "root@example.com" }]
//! ```

pub mod access_control;
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod membership;
pub mod metrics;
pub mod store;
pub mod transport;
pub mod util;

// Re-export main types
pub use app::{App, build};
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use metrics::AuthzMetrics;
