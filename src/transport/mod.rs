//! Transport module
//!
//! Network plumbing for serving the API router.

pub mod http;

pub use http::{DEFAULT_HTTP_PORT, HttpConfig, bind, serve, serve_on};
