//! Declarative extensions.
//!
//! Every subdirectory of the extensions directory may hold a `config.json`
//! declaring tables and views:
//!
//! ```json
//! {
//!   "Name": "pdfs",
//!   "Views": { "index": {
//!       "Path": "/pdfs", "ViewPath": "/views/index.html", "NeedsQuerying": true,
//!       "QueryVariableNames": ["Hash"],
//!       "DatabaseQuery": { "VariableType": {"Hash": "TEXT"}, "Contains": {},
//!                          "Set": {}, "TableName": "PDFS", "DatabaseOperation": "SELECT" } } },
//!   "DatabaseTables": { "pdfs": { "TableName": "PDFS", "Items": {"Hash": "TEXT", "Page": "INTEGER"} } }
//! }
//! ```
//!
//! Decoding is tolerant: unknown keys are ignored, missing fields default and
//! literal values may be strings, numbers or booleans. A broken extension is
//! logged and skipped without affecting the others.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Extension as RequestExtension, Router,
};
use serde::Deserialize;
use tower_http::services::ServeDir;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::query::{Operation, QuerySpec};
use crate::render::Bindings;
use crate::schema::{check_identifier, ColumnType, SchemaRegistry, TableSchema};
use crate::state::AppState;

pub const CONFIG_FILE: &str = "config.json";

/// A literal as written in a config document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Literal {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl Literal {
    fn into_text(self) -> String {
        match self {
            Literal::Text(s) => s,
            Literal::Integer(i) => i.to_string(),
            Literal::Real(f) => f.to_string(),
            Literal::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ExtensionDoc {
    name: Option<String>,
    views: BTreeMap<String, ViewDoc>,
    database_tables: BTreeMap<String, TableDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ViewDoc {
    path: String,
    view_path: String,
    needs_querying: bool,
    query_variable_names: Vec<String>,
    database_query: Option<QueryDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct QueryDoc {
    variable_type: BTreeMap<String, ColumnType>,
    contains: BTreeMap<String, Literal>,
    set: BTreeMap<String, Literal>,
    table_name: String,
    database_operation: Option<Operation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TableDoc {
    table_name: String,
    items: BTreeMap<String, ColumnType>,
}

/// A routed view of an extension.
#[derive(Debug, Clone)]
pub struct ViewBinding {
    pub name: String,
    pub path: String,
    /// Template reference handed to the renderer, `<extension dir>/<ViewPath>`.
    pub template: String,
    pub needs_querying: bool,
    pub query_variable_names: Vec<String>,
    pub query: Option<QuerySpec>,
}

#[derive(Debug, Clone)]
pub struct Extension {
    pub name: String,
    pub dir: PathBuf,
    pub tables: Vec<TableSchema>,
    pub views: Vec<ViewBinding>,
}

#[derive(Debug, Clone)]
pub struct SkippedExtension {
    pub dir: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<Extension>,
    pub skipped: Vec<SkippedExtension>,
}

fn decode_error(dir: &Path, msg: impl std::fmt::Display) -> AppError {
    AppError::ConfigDecode(format!("{}: {}", dir.display(), msg))
}

fn validate_view_path(dir: &Path, path: &str) -> AppResult<String> {
    let path = path.trim();
    if path.is_empty() {
        return Err(decode_error(dir, "view has no Path"));
    }
    if path.contains([':', '*', '{', '}', '?', '#']) || path.contains("..") {
        return Err(decode_error(dir, format!("view path '{}' contains reserved characters", path)));
    }
    let path = if path.starts_with('/') { path.to_string() } else { format!("/{}", path) };
    Ok(path)
}

/// Decodes one `config.json` into an [`Extension`] without touching the
/// database.
pub fn parse(dir: &Path, json: &[u8]) -> AppResult<Extension> {
    let doc: ExtensionDoc = serde_json::from_slice(json).map_err(|e| decode_error(dir, e))?;
    let dir_name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let name = doc.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| dir_name.clone());

    let mut tables = Vec::with_capacity(doc.database_tables.len());
    for (key, table) in doc.database_tables {
        let table_name = if table.table_name.trim().is_empty() { key } else { table.table_name };
        let schema = TableSchema::new(table_name, table.items);
        schema.validate()?;
        tables.push(schema);
    }

    let mut views = Vec::with_capacity(doc.views.len());
    for (view_name, view) in doc.views {
        let path = validate_view_path(dir, &view.path)?;
        for var in &view.query_variable_names {
            check_identifier("query variable", var)?;
        }
        let query = match view.database_query {
            Some(q) => {
                let operation = q
                    .database_operation
                    .ok_or_else(|| decode_error(dir, format!("view '{}' has no DatabaseOperation", view_name)))?;
                let mut spec = QuerySpec::new(operation, q.table_name);
                spec.column_types = q.variable_type;
                spec.predicate = q.contains.into_iter().map(|(k, v)| (k, v.into_text())).collect();
                spec.assignment = q.set.into_iter().map(|(k, v)| (k, v.into_text())).collect();
                Some(spec)
            }
            None if view.needs_querying => {
                return Err(decode_error(dir, format!("view '{}' needs querying but has no DatabaseQuery", view_name)));
            }
            None => None,
        };
        views.push(ViewBinding {
            name: view_name,
            path,
            template: format!("{}/{}", dir_name, view.view_path.trim_start_matches('/')),
            needs_querying: view.needs_querying,
            query_variable_names: view.query_variable_names,
            query,
        });
    }

    Ok(Extension { name, dir: dir.to_path_buf(), tables, views })
}

/// Reads, ensures and registers one extension. Tables become visible in
/// `registry` only when the whole extension succeeded.
async fn load_one(dir: &Path, db: &Database, registry: &mut SchemaRegistry) -> AppResult<Extension> {
    let bytes = fs::read(dir.join(CONFIG_FILE)).map_err(|e| decode_error(dir, format!("{}: {}", CONFIG_FILE, e)))?;
    let mut extension = parse(dir, &bytes)?;

    let mut scratch = registry.clone();
    for table in &extension.tables {
        scratch.ensure(db, table.clone()).await?;
    }
    for view in &mut extension.views {
        let Some(q) = view.query.as_mut() else { continue };
        let columns: Vec<&String> =
            q.predicate.keys().chain(q.assignment.keys()).chain(view.query_variable_names.iter()).collect();
        let schema = scratch.check(&q.table_name, columns)?;
        for (name, ty) in &schema.columns {
            if !q.column_types.keys().any(|k| k.eq_ignore_ascii_case(name)) {
                q.column_types.insert(name.clone(), *ty);
            }
        }
        // A query without request variables is complete already.
        if view.query_variable_names.is_empty() {
            q.build()?;
        }
    }
    *registry = scratch;
    Ok(extension)
}

/// Loads every extension below `dir`, in directory name order.
pub async fn load_all(dir: &Path, db: &Database, registry: &mut SchemaRegistry) -> LoadReport {
    let mut report = LoadReport::default();
    let mut dirs: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect(),
        Err(e) => {
            tracing::warn!("Extensions directory {:?} not readable: {}", dir, e);
            return report;
        }
    };
    dirs.sort();

    for ext_dir in dirs {
        match load_one(&ext_dir, db, registry).await {
            Ok(ext) => {
                tracing::info!(
                    "Loaded extension '{}' ({} tables, {} views)",
                    ext.name,
                    ext.tables.len(),
                    ext.views.len()
                );
                report.loaded.push(ext);
            }
            Err(e) => {
                tracing::warn!("Skipping extension {:?}: {}", ext_dir, e);
                report.skipped.push(SkippedExtension { dir: ext_dir, reason: e.to_string() });
            }
        }
    }
    db.metrics().add_extensions(report.loaded.len(), report.skipped.len());
    report
}

fn is_reserved(path: &str) -> bool {
    crate::routes::RESERVED_PATHS.iter().any(|r| {
        path == *r || (r.len() > 1 && path.starts_with(r) && path[r.len()..].starts_with('/'))
    })
}

fn is_url_segment(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && name != "."
        && name != ".."
}

/// One GET route per view plus the `css/` and `js/` directories of every
/// extension. Duplicate and reserved paths are skipped.
pub fn routes(extensions: &[Extension]) -> Router<AppState> {
    let mut router = Router::new();
    let mut taken: HashSet<String> = HashSet::new();

    for ext in extensions {
        for view in &ext.views {
            if is_reserved(&view.path) || !taken.insert(view.path.clone()) {
                tracing::warn!("Extension '{}': view '{}' path {} already taken, skipped", ext.name, view.name, view.path);
                continue;
            }
            let binding = Arc::new(view.clone());
            router = router.route(
                &view.path,
                get(
                    move |State(state): State<AppState>,
                          RequestExtension(user): RequestExtension<CurrentUser>,
                          Query(params): Query<HashMap<String, String>>| {
                        let binding = binding.clone();
                        async move { render_view(&state, &binding, &user.username, &params).await }
                    },
                ),
            );
        }

        for asset in ["css", "js"] {
            let src = ext.dir.join(asset);
            if !src.is_dir() {
                continue;
            }
            if !is_url_segment(&ext.name) {
                tracing::warn!("Extension '{}': name is not a URL segment, {} not served", ext.name, asset);
                continue;
            }
            let mount = format!("/{}/{}", ext.name, asset);
            if is_reserved(&mount) || taken.iter().any(|t| t == &mount || t.starts_with(&format!("{}/", mount))) {
                tracing::warn!("Extension '{}': {} already taken, skipped", ext.name, mount);
                continue;
            }
            taken.insert(mount.clone());
            router = router.nest_service(&mount, ServeDir::new(src));
        }
    }
    router
}

/// Fills the view's query from the request, runs it and renders the merged
/// rows. Later rows overwrite earlier ones key by key.
pub async fn render_view(
    state: &AppState,
    view: &ViewBinding,
    username: &str,
    params: &HashMap<String, String>,
) -> AppResult<Response> {
    let mut bind = Bindings::new();
    bind.insert("username".into(), serde_json::Value::String(username.to_string()));

    if view.needs_querying {
        if let Some(template) = &view.query {
            let mut spec = template.clone();
            for var in &view.query_variable_names {
                spec.predicate.insert(var.clone(), params.get(var).cloned().unwrap_or_default());
            }
            spec.execute(&state.db, &state.registry).await?;
            for row in &spec.result_rows {
                for (column, value) in row.iter() {
                    bind.insert(column.to_string(), serde_json::to_value(value).map_err(anyhow::Error::from)?);
                }
            }
        }
    }

    state.renderer.render(&view.template, &bind).map_err(AppError::Internal)
}
