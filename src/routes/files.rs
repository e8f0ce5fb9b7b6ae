use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    response::Response,
    Extension, Json,
};
use tokio::task::spawn_blocking;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::{
    error::{AppError, AppResult},
    middleware::{validation::sanitize_for_logging, CurrentUser},
    settings,
    state::AppState,
    types::{FilesQuery, FilesResponse},
    volume::sanitize_path,
};

/// Lists one directory of the volume, annotated with the caller's settings.
pub async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<FilesQuery>,
) -> AppResult<Json<FilesResponse>> {
    let requested = q.path.unwrap_or_default();
    tracing::debug!("{} lists '{}'", user.username, sanitize_for_logging(&requested));

    let volume = state.volume.clone();
    let path = requested.clone();
    // Hashing reads every file below the directory.
    let entries = spawn_blocking(move || volume.walk(&path))
        .await
        .map_err(|e| AppError::Internal(anyhow!("walk task join error: {}", e)))??;

    let user_settings = settings::settings_for_user(&state.db, &state.registry, &user.username).await?;
    let entries = settings::annotate(entries, &settings::by_extension(user_settings));

    Ok(Json(FilesResponse {
        volume: state.volume.name().to_string(),
        path: format!("/{}", sanitize_path(&requested)),
        breadcrumbs: state.volume.breadcrumbs(&requested),
        entries,
    }))
}

/// Serves one file of the volume. The path goes through [`Volume::resolve`]
/// so links pointing outside the root are refused.
///
/// [`Volume::resolve`]: crate::volume::Volume::resolve
pub async fn serve_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    req: Request,
) -> AppResult<Response> {
    let resolved = state.volume.resolve(&path)?;
    if !resolved.is_file() {
        return Err(AppError::NotFound(format!("file '{}'", sanitize_path(&path))));
    }
    let res = match ServeFile::new(resolved).oneshot(req).await {
        Ok(res) => res,
        Err(never) => match never {},
    };
    Ok(res.map(Body::new))
}
