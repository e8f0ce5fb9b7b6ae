use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Database;
use crate::metrics::Metrics;
use crate::middleware::auth::TokenStore;
use crate::render::Renderer;
use crate::schema::SchemaRegistry;
use crate::volume::Volume;

/// The shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Serialised statement executor over the single SQLite connection.
    pub db: Database,
    /// Every declared table, fixed once extensions are loaded.
    pub registry: Arc<SchemaRegistry>,
    pub config: Arc<AppConfig>,
    pub volume: Arc<Volume>,
    pub renderer: Arc<dyn Renderer>,
    pub auth: Arc<TokenStore>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        db: Database,
        registry: SchemaRegistry,
        config: AppConfig,
        volume: Volume,
        renderer: Arc<dyn Renderer>,
        auth: TokenStore,
    ) -> Self {
        let metrics = db.metrics().clone();
        Self {
            db,
            registry: Arc::new(registry),
            config: Arc::new(config),
            volume: Arc::new(volume.with_metrics(metrics.clone())),
            renderer,
            auth: Arc::new(auth),
            metrics,
        }
    }
}
