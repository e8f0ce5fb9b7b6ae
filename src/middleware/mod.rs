//! Cross-cutting request processing: bearer authentication, request
//! validation and security headers.

pub mod auth;
pub mod security_headers;
pub mod validation;

pub use auth::{auth_middleware, CurrentUser, TokenStore};
