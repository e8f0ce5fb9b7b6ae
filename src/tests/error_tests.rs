use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use std::io;

use crate::error::AppError;

#[test]
fn test_app_error_display() {
    let error = AppError::PathEscape("../x".to_string());
    assert_eq!(format!("{}", error), "Path escape: ../x");

    let error = AppError::StatementBuild("table name must not be empty".to_string());
    assert_eq!(format!("{}", error), "Statement build error: table name must not be empty");

    let error = AppError::ValidationError { field: "extension".into(), message: "bad".into() };
    assert_eq!(format!("{}", error), "Validation error on field 'extension': bad");
}

#[test]
fn test_app_error_status_codes() {
    let cases = vec![
        (AppError::PathEscape("p".into()), StatusCode::FORBIDDEN),
        (AppError::NotFound("n".into()), StatusCode::NOT_FOUND),
        (AppError::SchemaConflict("s".into()), StatusCode::CONFLICT),
        (AppError::StatementBuild("b".into()), StatusCode::BAD_REQUEST),
        (AppError::Execution("e".into()), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::ConfigDecode("c".into()), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::BadRequest("b".into()), StatusCode::BAD_REQUEST),
        (AppError::Unauthorized("u".into()), StatusCode::UNAUTHORIZED),
        (AppError::IoError("i".into()), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::Internal(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (error, status) in cases {
        assert_eq!(error.into_response().status(), status);
    }
}

#[tokio::test]
async fn test_error_body_shape() {
    let response = AppError::PathEscape("../../etc/passwd".into()).into_response();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 403);
    assert_eq!(json["error"]["code"], "PATH_ESCAPE");
    // the offending path is not echoed back
    assert!(!json["error"]["message"].as_str().unwrap().contains("passwd"));
    assert!(json["timestamp"].is_string());
}

#[test]
fn test_from_io_error() {
    let app_error: AppError = io::Error::new(io::ErrorKind::NotFound, "File not found").into();
    match app_error {
        AppError::IoError(msg) => {
            assert!(msg.contains("not found") || msg.contains("NotFound"));
            assert!(msg.contains("File not found"));
        }
        other => panic!("Expected IoError variant, got {:?}", other),
    }
}

#[test]
fn test_from_globset_error() {
    let err = globset::Glob::new("[invalid").unwrap_err();
    match AppError::from(err) {
        AppError::BadRequest(msg) => assert!(msg.contains("Invalid glob pattern")),
        other => panic!("Expected BadRequest variant, got {:?}", other),
    }
}

#[test]
fn test_from_sqlx_errors() {
    assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
    assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::Execution(_)));
}

