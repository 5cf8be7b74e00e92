//! API middleware

use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// X-Request-Id header name
pub const X_REQUEST_ID: &str = "X-Request-Id";

/// Middleware to handle X-Request-Id
///
/// - Accepts inbound X-Request-Id or generates UUIDv4 if absent
/// - Attaches to the tracing span
/// - Echoes in the response header
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::Span::current().record("request_id", &request_id);
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(header::HeaderName::from_static("x-request-id"), header_value);
    }

    response
}
