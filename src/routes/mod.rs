//! HTTP route handlers.
//!
//! - `health`: liveness, readiness, version and metrics (public)
//! - `files`: annotated directory listings of the volume
//! - `settings`: per-user file type settings
//!
//! Extension views are routed by [`crate::extension::routes`].

pub mod files;
pub mod health;
pub mod settings;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};

use crate::extension::{self, Extension};
use crate::middleware;
use crate::state::AppState;

/// Paths owned by the core routes. `/volume` also reserves everything below it.
pub const RESERVED_PATHS: &[&str] =
    &["/", "/healthz", "/readyz", "/version", "/metrics", "/files", "/settings", "/volume"];

/// The full router: public probes, then everything else behind bearer auth.
/// Transport layers (tracing, compression, CORS) are added by the binary.
pub fn app(state: AppState, extensions: &[Extension]) -> Router {
    let public = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/version", get(health::version))
        .route("/metrics", get(health::metrics));

    let protected = Router::new()
        .route("/files", get(files::list_files))
        .route("/settings", get(settings::get_settings).post(settings::put_setting))
        .route("/volume/{*path}", get(files::serve_file))
        .merge(extension::routes(extensions))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let cfg = state.config.clone();
    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(from_fn_with_state(cfg, middleware::security_headers::security_headers_middleware))
}
