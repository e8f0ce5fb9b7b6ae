use axum::{extract::State, Extension, Json};

use crate::{
    error::{AppError, AppResult},
    middleware::CurrentUser,
    settings,
    state::AppState,
    types::{FileTypeSetting, SettingRequest},
};

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<Vec<FileTypeSetting>>> {
    let rows = settings::settings_for_user(&state.db, &state.registry, &user.username).await?;
    Ok(Json(rows))
}

/// Creates or replaces the caller's setting for one extension.
pub async fn put_setting(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SettingRequest>,
) -> AppResult<Json<FileTypeSetting>> {
    let extension = req.extension.trim().to_ascii_lowercase();
    if !extension.starts_with('.') || extension.len() < 2 || extension.contains(['/', '\\']) {
        return Err(AppError::ValidationError {
            field: "extension".into(),
            message: "must be a dot-prefixed file extension like '.pdf'".into(),
        });
    }
    let application_link = req.application_link.trim().to_string();
    if application_link.is_empty() {
        return Err(AppError::ValidationError {
            field: "application_link".into(),
            message: "must not be empty".into(),
        });
    }

    let setting = FileTypeSetting {
        username: user.username,
        extension,
        icon: req.icon.unwrap_or_default().trim().to_string(),
        application_link,
    };
    settings::upsert_setting(&state.db, &state.registry, &setting).await?;
    tracing::info!("{} set {} -> {}", setting.username, setting.extension, setting.application_link);
    Ok(Json(setting))
}
