//! Supervisor bypass policy
//!
//! Supervisors are global super-users, but inside a workspace they only act
//! as an admin for the operations this policy lists. The defaults keep the
//! long-standing behavior: supervisors may add members, update and delete
//! workspaces, but may not remove members or change roles unless they are
//! admins of the workspace themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutating workspace operations subject to the admin check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipOperation {
    AddMember,
    RemoveMember,
    ChangeRole,
    UpdateWorkspace,
    DeleteWorkspace,
}

impl MembershipOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipOperation::AddMember => "add_member",
            MembershipOperation::RemoveMember => "remove_member",
            MembershipOperation::ChangeRole => "change_role",
            MembershipOperation::UpdateWorkspace => "update_workspace",
            MembershipOperation::DeleteWorkspace => "delete_workspace",
        }
    }

    /// Phrase used in "only workspace admins can ..." messages
    pub fn action(&self) -> &'static str {
        match self {
            MembershipOperation::AddMember => "add users",
            MembershipOperation::RemoveMember => "remove users",
            MembershipOperation::ChangeRole => "change user roles",
            MembershipOperation::UpdateWorkspace => "update the workspace",
            MembershipOperation::DeleteWorkspace => "delete the workspace",
        }
    }
}

impl fmt::Display for MembershipOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which operations a supervisor may perform without being a workspace admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorBypass {
    pub add_member: bool,
    pub remove_member: bool,
    pub change_role: bool,
    pub update_workspace: bool,
    pub delete_workspace: bool,
}

impl Default for SupervisorBypass {
    fn default() -> Self {
        Self {
            add_member: true,
            remove_member: false,
            change_role: false,
            update_workspace: true,
            delete_workspace: true,
        }
    }
}

impl SupervisorBypass {
    /// Supervisors never act as admins
    pub fn none() -> Self {
        Self {
            add_member: false,
            remove_member: false,
            change_role: false,
            update_workspace: false,
            delete_workspace: false,
        }
    }

    /// Supervisors act as admins everywhere
    pub fn all() -> Self {
        Self {
            add_member: true,
            remove_member: true,
            change_role: true,
            update_workspace: true,
            delete_workspace: true,
        }
    }

    pub fn allows(&self, operation: MembershipOperation) -> bool {
        match operation {
            MembershipOperation::AddMember => self.add_member,
            MembershipOperation::RemoveMember => self.remove_member,
            MembershipOperation::ChangeRole => self.change_role,
            MembershipOperation::UpdateWorkspace => self.update_workspace,
            MembershipOperation::DeleteWorkspace => self.delete_workspace,
        }
    }
}
