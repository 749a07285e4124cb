//! Configuration types for crm-access
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::access_control::{ModuleDef, crm_module};
use crate::membership::SupervisorBypass;
use crate::util::SecretString;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Workspace membership rules
    pub membership: MembershipConfig,

    /// Modules, permissions and roles to provision at startup
    pub catalog: CatalogConfig,

    /// Initial supervisor and static bearer tokens
    pub bootstrap: BootstrapConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Name reported by `/health`
    pub name: String,
    /// Allowed CORS origins; `["*"]` allows any, empty disables CORS
    pub cors_origins: Vec<String>,
    /// Try the next ports when `port` is taken instead of failing
    pub port_fallback: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 20290,
            name: "crm-access".to_string(),
            cors_origins: Vec::new(),
            port_fallback: false,
        }
    }
}

/// Membership configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Which workspace operations a supervisor may perform without being
    /// an admin of the workspace
    pub supervisor_bypass: SupervisorBypass,
}

/// Catalog configuration
///
/// ```toml
/// [catalog]
/// builtin = true
///
/// [[catalog.modules]]
/// name = "PM"
/// permissions = [{ name = "pm.task.read", description = "View tasks" }]
/// roles = [{ name = "PM Viewer", permissions = ["pm.task.read"] }]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Seed the built-in CRM module
    pub builtin: bool,

    /// Additional module definitions
    pub modules: Vec<ModuleDef>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            builtin: true,
            modules: Vec::new(),
        }
    }
}

impl CatalogConfig {
    /// Every module to provision, built-in first
    pub fn module_defs(&self) -> Vec<ModuleDef> {
        let mut defs = Vec::with_capacity(self.modules.len() + 1);
        if self.builtin {
            defs.push(crm_module());
        }
        defs.extend(self.modules.iter().cloned());
        defs
    }
}

/// Startup bootstrap configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Created as a supervisor on startup if no user with this email exists
    pub supervisor_email: Option<String>,

    /// Static bearer tokens
    pub tokens: Vec<TokenConfig>,
}

/// One static bearer token and the user it authenticates as
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub token: SecretString,
    pub email: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
