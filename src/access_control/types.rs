//! Access control types
//!
//! Core records of the role graph and the naming rules for permissions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

/// `<module>.<resource>.<action>`, lower-case, at least two dot-separated segments
static PERMISSION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)+$").expect("permission regex is valid")
});

/// Module names are the upper-case labels routes declare (`CRM`, `PM`, `ACC`)
static MODULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("module regex is valid"));

/// The prefix every permission of `module` starts with
pub fn module_prefix(module: &str) -> String {
    format!("{}.", module.to_lowercase())
}

/// Check whether a permission name belongs to a module
pub fn belongs_to_module(permission: &str, module: &str) -> bool {
    permission.starts_with(&module_prefix(module))
}

/// Validate the shape of a permission name, returning the reason on failure
pub fn validate_permission_name(name: &str) -> Result<(), String> {
    if PERMISSION_NAME.is_match(name) {
        Ok(())
    } else {
        Err("expected lower-case dot-separated segments like 'crm.lead.read'".to_string())
    }
}

/// Validate the shape of a module name
pub fn validate_module_name(name: &str) -> Result<(), String> {
    if MODULE_NAME.is_match(name) {
        Ok(())
    } else {
        Err("expected an alphanumeric identifier like 'CRM'".to_string())
    }
}

/// A product area owning a set of permissions and roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// A single grantable capability, named `<module>.<resource>.<action>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub module_id: Uuid,
}

/// A named bundle of permissions within one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub module_id: Uuid,
}

/// Declarative definition of a permission, used when provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PermissionDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
        }
    }
}

/// Declarative definition of a role and the permissions it grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Declarative definition of a whole module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionDef>,
    #[serde(default)]
    pub roles: Vec<RoleDef>,
}

/// A role together with the permission names it grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleGrants {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_module_prefix_lowercases() {
        assert_eq!(module_prefix("CRM"), "crm.");
        assert_eq!(module_prefix("Acc"), "acc.");
    }

    #[rstest]
    #[case("crm.lead.read", "CRM", true)]
    #[case("crm.reports.view", "crm", true)]
    #[case("pm.read", "CRM", false)]
    #[case("crmx.lead.read", "CRM", false)]
    #[case("crm", "CRM", false)]
    fn test_belongs_to_module(#[case] permission: &str, #[case] module: &str, #[case] expected: bool) {
        assert_eq!(belongs_to_module(permission, module), expected);
    }

    #[rstest]
    #[case("crm.lead.read", true)]
    #[case("crm.deal.change_stage", true)]
    #[case("pm.read", true)]
    #[case("crm", false)]
    #[case("CRM.lead.read", false)]
    #[case("crm..read", false)]
    #[case("crm.lead.", false)]
    #[case("crm lead read", false)]
    fn test_validate_permission_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_permission_name(name).is_ok(), valid, "{}", name);
    }

    #[test]
    fn test_validate_module_name() {
        assert!(validate_module_name("CRM").is_ok());
        assert!(validate_module_name("PM2").is_ok());
        assert!(validate_module_name("").is_err());
        assert!(validate_module_name("crm.lead").is_err());
    }
}
