//! Workspace membership
//!
//! Workspaces, their `(user, role)` rows and the invariant that a workspace
//! with members always keeps at least one ADMIN.

pub mod engine;
pub mod policy;
pub mod types;
pub mod users;

pub use engine::MembershipEngine;
pub use policy::{MembershipOperation, SupervisorBypass};
pub use types::{
    Headcount, MemberRef, Membership, NewMember, UserWorkspace, Workspace, WorkspaceChanges,
    WorkspaceMember, WorkspaceRole,
};
pub use users::UserDirectory;
