use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The primary error type for the application.
///
/// Covers the core taxonomy (sandboxing, statement building, execution,
/// extension configuration) and the errors of the HTTP surface around it.
#[derive(Debug, Error)]
pub enum AppError {
    /// A path tried to leave the configured volume root.
    #[error("Path escape: {0}")]
    PathEscape(String),
    /// A file, directory or row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// A table already exists with different columns than declared.
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),
    /// A statement could not be assembled (bad identifier, empty table name,
    /// unparsable typed literal, unbounded mutation).
    #[error("Statement build error: {0}")]
    StatementBuild(String),
    /// The database engine rejected or failed a statement.
    #[error("Execution error: {0}")]
    Execution(String),
    /// An extension configuration document could not be decoded.
    #[error("Config decode error: {0}")]
    ConfigDecode(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Validation error on field '{field}': {message}")]
    ValidationError {
        /// The name of the field that failed validation.
        field: String,
        message: String,
    },
    #[error("I/O error: {0}")]
    IoError(String),
    /// For internal server errors that are not expected to be handled by the client.
    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message, details) = match self {
            AppError::PathEscape(msg) => {
                tracing::warn!("Path escape rejected: {}", msg);
                (StatusCode::FORBIDDEN, "PATH_ESCAPE", "Path leaves the volume".to_string(), None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::SchemaConflict(msg) => (StatusCode::CONFLICT, "SCHEMA_CONFLICT", msg, None),
            AppError::StatementBuild(msg) => (StatusCode::BAD_REQUEST, "STATEMENT_BUILD", msg, None),
            AppError::Execution(msg) => {
                tracing::error!("Execution error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EXECUTION_ERROR",
                    "A database error occurred".to_string(),
                    Some(json!({ "details": msg })),
                )
            }
            AppError::ConfigDecode(msg) => {
                tracing::error!("Config decode error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_DECODE", msg, None)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            AppError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
            AppError::IoError(msg) => {
                tracing::error!("I/O error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    "An I/O error occurred".to_string(),
                    Some(json!({ "details": msg })),
                )
            }
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!("Internal error {}: {:?}", error_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => AppError::Execution(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => {
                AppError::Execution("Database connection pool timed out".to_string())
            }
            _ => AppError::Execution(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(format!("{}: {}", err.kind(), err))
    }
}

impl From<globset::Error> for AppError {
    fn from(err: globset::Error) -> Self {
        AppError::BadRequest(format!("Invalid glob pattern: {}", err))
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;
