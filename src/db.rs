//! The statement executor shared by the schema registry and the query engine.
//!
//! SQLite is opened with a single connection and every statement additionally
//! runs under one async mutex, so DDL and queries are strictly serialised.
//! Throughput is traded for a consistent view of every table.

use std::sync::Arc;

use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{query::Query, Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use crate::error::AppResult;
use crate::metrics::Metrics;
use crate::query::{Row, Statement, Value};
use crate::schema::{ColumnType, SchemaRegistry, TableSchema};

/// Name of the core table holding per-user file-type settings.
pub const FILE_SETTINGS_TABLE: &str = "FileSettings";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    gate: Arc<Mutex<()>>,
    metrics: Metrics,
}

impl Database {
    pub fn new(pool: SqlitePool, metrics: Metrics) -> Self {
        Self { pool, gate: Arc::new(Mutex::new(())), metrics }
    }

    /// Opens a single-connection pool for `url`.
    pub async fn connect(url: &str, metrics: Metrics) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                    Ok(())
                })
            })
            .connect(url)
            .await?;
        Ok(Self::new(pool, metrics))
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runs a statement that returns no rows and reports the affected-row count.
    pub async fn execute(&self, stmt: &Statement) -> AppResult<u64> {
        let _guard = self.gate.lock().await;
        let result = bind_all(sqlx::query(stmt.sql()), stmt.binds()).execute(&self.pool).await;
        match result {
            Ok(done) => {
                self.metrics.inc_statements_executed();
                Ok(done.rows_affected())
            }
            Err(e) => {
                self.metrics.inc_statement_failures();
                Err(e.into())
            }
        }
    }

    /// Runs a statement and reads the whole result set. Either every row is
    /// returned or an error; partial results are never handed out.
    pub async fn fetch_rows(&self, stmt: &Statement) -> AppResult<Vec<Row>> {
        let _guard = self.gate.lock().await;
        let result = bind_all(sqlx::query(stmt.sql()), stmt.binds()).fetch_all(&self.pool).await;
        match result {
            Ok(rows) => {
                self.metrics.inc_statements_executed();
                rows.iter().map(decode_row).collect()
            }
            Err(e) => {
                self.metrics.inc_statement_failures();
                Err(e.into())
            }
        }
    }

    /// Liveness probe used by `/readyz`.
    pub async fn ping(&self) -> AppResult<()> {
        let _guard = self.gate.lock().await;
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in binds {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Integer(i) => query.bind(*i),
            Value::Real(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Blob(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Converts a driver row into an ordered column -> value row, using the
/// storage class SQLite reports for each cell.
fn decode_row(row: &SqliteRow) -> AppResult<Row> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let kind = raw.type_info().name().to_ascii_uppercase();
            match kind.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" | "FLOAT" | "DOUBLE" => Value::Real(row.try_get_unchecked::<f64, _>(idx)?),
                "BLOB" => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

/// Schema of the core settings table, declared like any extension table.
pub fn file_settings_schema() -> TableSchema {
    TableSchema::new(
        FILE_SETTINGS_TABLE,
        [
            ("Username", ColumnType::Text),
            ("Extension", ColumnType::Text),
            ("Icon", ColumnType::Text),
            ("ApplicationLink", ColumnType::Text),
        ],
    )
}

/// Applies connection pragmas and ensures the core tables.
pub async fn init_db(db: &Database, registry: &mut SchemaRegistry) -> AppResult<()> {
    // Pragmas for better durability/performance
    for pragma in ["PRAGMA journal_mode=WAL;", "PRAGMA synchronous=NORMAL;", "PRAGMA temp_store=MEMORY;"] {
        if let Err(e) = db.execute(&Statement::raw(pragma)).await {
            tracing::warn!("Failed to apply {}: {}", pragma, e);
        }
    }

    registry.ensure(db, file_settings_schema()).await?;
    Ok(())
}
