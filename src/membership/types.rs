//! Workspace membership types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role a user holds inside one workspace
///
/// Only `Admin` is privileged; `Member` and `Consultant` are equivalent
/// as far as membership management is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceRole {
    Admin,
    #[default]
    Member,
    Consultant,
}

impl WorkspaceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceRole::Admin => "ADMIN",
            WorkspaceRole::Member => "MEMBER",
            WorkspaceRole::Consultant => "CONSULTANT",
        }
    }

    /// Parse a role name, accepting any letter case
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(WorkspaceRole::Admin),
            "MEMBER" => Some(WorkspaceRole::Member),
            "CONSULTANT" => Some(WorkspaceRole::Consultant),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, WorkspaceRole::Admin)
    }
}

impl fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One `(user, workspace, role)` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

/// A member as listed to other members of the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceMember {
    pub id: Uuid,
    pub email: String,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

/// A workspace together with the caller's role in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserWorkspace {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub role: WorkspaceRole,
}

/// Partial update of a workspace's descriptive fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkspaceChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl WorkspaceChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Identifies the user to add to a workspace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MemberRef {
    Id { user_id: Uuid },
    Email { email: String },
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRef::Id { user_id } => write!(f, "{}", user_id),
            MemberRef::Email { email } => f.write_str(email),
        }
    }
}

/// Request to add one user to a workspace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewMember {
    #[serde(flatten)]
    pub user: MemberRef,
    #[serde(default)]
    pub role: WorkspaceRole,
}

impl NewMember {
    pub fn by_id(user_id: Uuid, role: WorkspaceRole) -> Self {
        Self {
            user: MemberRef::Id { user_id },
            role,
        }
    }

    pub fn by_email(email: impl Into<String>, role: WorkspaceRole) -> Self {
        Self {
            user: MemberRef::Email {
                email: email.into(),
            },
            role,
        }
    }
}

/// Admin and member counts of one workspace a user belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Headcount {
    pub workspace_id: Uuid,
    pub role: WorkspaceRole,
    pub admins: usize,
    pub members: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_is_screaming_snake() {
        let json = serde_json::to_string(&WorkspaceRole::Consultant).unwrap();
        assert_eq!(json, "\"CONSULTANT\"");

        let role: WorkspaceRole = serde_json::from_str("\"ADMIN\"").unwrap();
        assert_eq!(role, WorkspaceRole::Admin);
    }

    #[test]
    fn test_role_try_parse() {
        assert_eq!(WorkspaceRole::try_parse("admin"), Some(WorkspaceRole::Admin));
        assert_eq!(WorkspaceRole::try_parse("Member"), Some(WorkspaceRole::Member));
        assert_eq!(WorkspaceRole::try_parse("owner"), None);
    }

    #[test]
    fn test_default_role_is_member() {
        assert_eq!(WorkspaceRole::default(), WorkspaceRole::Member);
        assert!(!WorkspaceRole::default().is_admin());
    }

    #[test]
    fn test_new_member_deserializes_by_id_or_email() {
        let id = Uuid::new_v4();
        let by_id: NewMember =
            serde_json::from_value(serde_json::json!({ "user_id": id, "role": "ADMIN" })).unwrap();
        assert_eq!(by_id, NewMember::by_id(id, WorkspaceRole::Admin));

        let by_email: NewMember =
            serde_json::from_value(serde_json::json!({ "email": "b@example.com" })).unwrap();
        assert_eq!(
            by_email,
            NewMember::by_email("b@example.com", WorkspaceRole::Member)
        );
    }
}
