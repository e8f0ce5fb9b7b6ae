use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dateiwerk::{
    config, db,
    db::Database,
    extension,
    metrics::Metrics,
    middleware::{validation::MAX_BODY_BYTES, TokenStore},
    render::JsonRenderer,
    routes,
    schema::SchemaRegistry,
    state::AppState,
    volume::Volume,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging (stdout + daily file rotation under ./logs)
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "dateiwerk.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Keep the guards alive so the non-blocking writers flush
    let _log_guards = (stdout_guard, file_guard);

    // Load configuration (embedded defaults -> dateiwerk.toml -> env/.env)
    let app_cfg = config::load()?;

    // Prepare data dir (if sqlite)
    let db_url = &app_cfg.database.url;
    config::ensure_sqlite_parent_dir(db_url)?;
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        info!("Creating SQLite database at {}", db_url);
        Sqlite::create_database(db_url).await?;
    }
    let metrics = Metrics::new();
    let database = Database::connect(db_url, metrics).await?;

    let mut registry = SchemaRegistry::new();
    db::init_db(&database, &mut registry).await?;

    let report = extension::load_all(Path::new(&app_cfg.extensions.dir), &database, &mut registry).await;
    info!(
        "{} extension(s) loaded, {} skipped, {} table(s) declared",
        report.loaded.len(),
        report.skipped.len(),
        registry.table_count()
    );

    std::fs::create_dir_all(&app_cfg.volume.path)?;
    let volume = Volume::new(&app_cfg.volume.name, &app_cfg.volume.path, &app_cfg.volume.excludes)?;
    info!("Serving volume '{}' from {}", volume.name(), volume.root().display());

    let auth = TokenStore::from_config(&app_cfg.auth.users)?;
    let state = AppState::new(database, registry, app_cfg.clone(), volume, Arc::new(JsonRenderer), auth);

    let app = routes::app(state, &report.loaded)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    // CORS: permissive in debug builds for a separately served UI
    let app = if cfg!(debug_assertions) { app.layer(CorsLayer::permissive()) } else { app };

    let port: u16 = app_cfg.server.port;
    let host: String = app_cfg.server.host.clone();
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Dateiwerk listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
