//! # Dateiwerk
//!
//! An authenticated file browser over one sandboxed storage volume, with
//! declarative extensions that bring their own SQLite tables and views.
//!
//! ## Core
//!
//! - [`volume`]: path sanitizing, directory listings, SHA-256 content hashes
//!   for files and aggregate hashes for directory subtrees
//! - [`schema`]: declared tables, idempotent DDL, the identifier allow-list
//! - [`query`]: parameterized INSERT/SELECT/UPDATE/DELETE built from a
//!   [`query::QuerySpec`], results as generic rows
//! - [`db`]: the serialised statement executor
//! - [`settings`]: per-user "open with" settings merged into listings
//! - [`extension`]: loading `config.json` documents and routing their views
//!
//! ## Around it
//!
//! - [`config`]: layered configuration (embedded defaults, file, environment)
//! - [`error`]: error taxonomy and HTTP error responses
//! - [`metrics`]: process counters
//! - [`middleware`]: bearer auth, request validation, security headers
//! - [`render`]: the view rendering seam
//! - [`routes`]: HTTP handlers and the router
//! - [`state`]: shared application state
//! - [`types`]: data transfer objects

pub mod config;
pub mod db;
pub mod error;
pub mod extension;
pub mod metrics;
pub mod middleware;
pub mod query;
pub mod render;
pub mod routes;
pub mod schema;
pub mod settings;
pub mod state;
pub mod types;
pub mod volume;

#[cfg(test)]
mod tests;
