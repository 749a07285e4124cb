//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (CRM_ACCESS__*)
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::access_control::validate_module_def;
use crate::config::types::AppConfig;
use crate::error::{CatalogError, ConfigError};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashSet;
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "crm-access.toml",
    ".crm-access.toml",
    "~/.config/crm-access/config.toml",
    "/etc/crm-access/config.toml",
];

/// Prefix of environment overrides, e.g. `CRM_ACCESS__SERVER__PORT`
const ENV_PREFIX: &str = "CRM_ACCESS";

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Explicit path provided - must exist
        let expanded = shellexpand::tilde(path);
        if !Path::new(expanded.as_ref()).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
    } else {
        // First existing default path wins
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // Double underscore (__) maps to nested keys (server.port)
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::Invalid {
            message: "server.port must be greater than 0".to_string(),
        });
    }

    if config.server.host.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: "server.host".to_string(),
        });
    }

    validate_catalog(config)?;
    validate_bootstrap(config)?;

    Ok(())
}

fn validate_catalog(config: &AppConfig) -> Result<(), ConfigError> {
    let mut seen_modules = HashSet::new();
    let mut seen_permissions = HashSet::new();

    for def in config.catalog.module_defs() {
        if !seen_modules.insert(def.name.to_lowercase()) {
            return Err(ConfigError::Invalid {
                message: format!("catalog module '{}' is declared twice", def.name),
            });
        }

        validate_module_def(&def).map_err(|e| match e {
            CatalogError::InvalidPermission { name, reason } => {
                ConfigError::InvalidPermission { name, reason }
            }
            other => ConfigError::Invalid {
                message: format!("catalog module '{}': {}", def.name, other),
            },
        })?;

        // Permission names are globally unique
        for permission in &def.permissions {
            if !seen_permissions.insert(permission.name.clone()) {
                return Err(ConfigError::Invalid {
                    message: format!("permission '{}' is declared twice", permission.name),
                });
            }
        }
    }

    Ok(())
}

fn validate_bootstrap(config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(email) = &config.bootstrap.supervisor_email
        && !looks_like_email(email)
    {
        return Err(ConfigError::Invalid {
            message: format!("bootstrap.supervisor_email is not an email: {}", email),
        });
    }

    for (i, token) in config.bootstrap.tokens.iter().enumerate() {
        if token.token.is_empty() {
            return Err(ConfigError::Missing {
                field: format!("bootstrap.tokens[{}].token", i),
            });
        }
        if !looks_like_email(&token.email) {
            return Err(ConfigError::Invalid {
                message: format!("bootstrap.tokens[{}].email is not an email: {}", i, token.email),
            });
        }
    }

    Ok(())
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !value.contains(' '),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    #[test]
    fn test_load_config_from_str_basic() {
        let toml = r#"
[server]
name = "test-server"
port = 8080

[logging]
format = "json"
"#;

        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.name, "test-server");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.catalog.builtin);
    }

    #[test]
    fn test_supervisor_bypass_overrides() {
        let toml = r#"
[membership.supervisor_bypass]
add_member = false
remove_member = true
"#;

        let config = load_config_from_str(toml).unwrap();
        let bypass = &config.membership.supervisor_bypass;
        assert!(!bypass.add_member);
        assert!(bypass.remove_member);
        // untouched fields keep their defaults
        assert!(bypass.delete_workspace);
        assert!(!bypass.change_role);
    }

    #[test]
    fn test_custom_module() {
        let toml = r#"
[[catalog.modules]]
name = "PM"
description = "Project management"
permissions = [
    { name = "pm.task.read", description = "View tasks" },
    { name = "pm.task.update" },
]
roles = [{ name = "PM Viewer", permissions = ["pm.task.read"] }]
"#;

        let config = load_config_from_str(toml).unwrap();
        let defs = config.catalog.module_defs();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].permissions.len(), 2);
        assert_eq!(defs[1].roles[0].permissions, vec!["pm.task.read"]);
    }

    #[test]
    fn test_foreign_permission_rejected() {
        let toml = r#"
[[catalog.modules]]
name = "PM"
permissions = [{ name = "crm.task.read" }]
"#;

        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPermission { .. }));
    }

    #[test]
    fn test_duplicate_builtin_module_rejected() {
        let toml = r#"
[[catalog.modules]]
name = "CRM"
"#;

        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_zero_port_rejected() {
        let toml = r#"
[server]
port = 0
"#;

        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn test_bootstrap_tokens() {
        let toml = r#"
[bootstrap]
supervisor_email = "root@example.com"
tokens = [{ token = "tok-root", email = "root@example.com" }]
"#;

        let config = load_config_from_str(toml).unwrap();
        assert_eq!(
            config.bootstrap.supervisor_email.as_deref(),
            Some("root@example.com")
        );
        assert!(config.bootstrap.tokens[0].token.matches("tok-root"));
    }

    #[test]
    fn test_bootstrap_bad_email_rejected() {
        let toml = r#"
[bootstrap]
tokens = [{ token = "tok", email = "not-an-email" }]
"#;

        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
