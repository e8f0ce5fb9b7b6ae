use axum::{
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;

/// Largest accepted request body. Only small JSON documents are posted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Rejects request paths with traversal sequences and oversized bodies, and
/// logs suspicious user agents.
///
/// Only the URI path is checked here; `?path=` values of `/files` go through
/// the volume sanitizer instead.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    let uri_path = req.uri().path();
    if contains_path_traversal(uri_path) {
        tracing::warn!("Path traversal in request URI: {}", sanitize_for_logging(uri_path));
        return AppError::BadRequest("Path traversal detected in request".into()).into_response();
    }

    if let Some(ua) = req.headers().get("user-agent").and_then(|v| v.to_str().ok()) {
        if is_suspicious_user_agent(ua) {
            tracing::warn!("Suspicious user agent detected: {}", sanitize_for_logging(ua));
        }
    }

    if matches!(req.method(), &Method::POST | &Method::PUT) {
        let length = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok());
        if let Some(length) = length {
            if length > MAX_BODY_BYTES {
                return AppError::ValidationError {
                    field: "body".into(),
                    message: format!("Request body exceeds maximum size of {} bytes", MAX_BODY_BYTES),
                }
                .into_response();
            }
        }
    }

    next.run(req).await
}

fn contains_path_traversal(path: &str) -> bool {
    let lower = path.to_lowercase();

    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }
    if path.contains("/./") || path.contains("\\.\\") {
        return true;
    }
    // bypass attempt: ....
    if path.contains("....") {
        return true;
    }

    // single and double URL encoding
    let encoded_patterns = [
        "%2e%2e", "%252e%252e", "%2e/", "%252e%2f", "/%2e", "%2f%2e", "%2e\\", "%2e%5c", "%5c%2e", "%5c%5c", "%00",
    ];
    if encoded_patterns.iter().any(|p| lower.contains(p)) {
        return true;
    }

    path.contains('\0')
}

fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua_lower = ua.to_lowercase();
    ua_lower.contains("scanner")
        || (ua_lower.contains("crawler") && !ua_lower.contains("googlebot") && !ua_lower.contains("bingbot"))
        || ["nikto", "sqlmap", "havij", "acunetix"].iter().any(|t| ua_lower.contains(t))
}

/// Strips control characters, escapes quotes and truncates to 200 chars, so
/// user input can be logged safely.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\\'")
}
