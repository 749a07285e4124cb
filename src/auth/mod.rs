//! Authentication module
//!
//! Turns bearer tokens into a [`UserContext`] for the authorization layer.
//! Only static configured tokens are supported; the [`Authenticator`] trait
//! is the seam for an external identity provider.

pub mod middleware;
pub mod provider;
pub mod token;
pub mod user;

pub use middleware::{CurrentUser, authenticate_request};
pub use provider::{Authenticator, SharedAuthenticator, bearer_token};
pub use token::StaticTokenAuthenticator;
pub use user::{User, UserContext};
