//! Integration tests across modules.
//!
//! - **schema_tests**: table DDL, idempotence and drift detection
//! - **query_tests**: statements executed against SQLite, upsert
//! - **volume_tests**: listings, hashes and sandboxing on real trees
//! - **extension_tests**: loading extension directories, view handlers
//! - **api_tests**: the HTTP surface through the full router
//! - **config_tests**: configuration defaults, layering and validation
//! - **error_tests**: error conversions and status codes

pub mod config_tests;
pub mod error_tests;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use crate::config::AppConfig;
use crate::db::{self, Database};
use crate::metrics::Metrics;
use crate::middleware::TokenStore;
use crate::render::JsonRenderer;
use crate::schema::SchemaRegistry;
use crate::state::AppState;
use crate::volume::Volume;

pub const ALICE_TOKEN: &str = "alice-secret-token-0001";
pub const BOB_TOKEN: &str = "bob-secret-token-00002";

/// A fresh in-memory database on a single connection.
pub async fn memory_db() -> Database {
    let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
    Database::new(pool, Metrics::new())
}

/// In-memory database with the core tables ensured.
pub async fn initialized_db() -> (Database, SchemaRegistry) {
    let db = memory_db().await;
    let mut registry = SchemaRegistry::new();
    db::init_db(&db, &mut registry).await.unwrap();
    (db, registry)
}

pub fn test_state(db: Database, registry: SchemaRegistry, volume_root: &Path) -> AppState {
    let mut config = AppConfig::default();
    config.volume.path = volume_root.display().to_string();
    let volume = Volume::new("files", volume_root, &[]).unwrap();
    let auth = TokenStore::new(HashMap::from([
        ("alice".to_string(), ALICE_TOKEN.to_string()),
        ("bob".to_string(), BOB_TOKEN.to_string()),
    ]));
    AppState::new(db, registry, config, volume, Arc::new(JsonRenderer), auth)
}
