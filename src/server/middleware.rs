//! HTTP middleware for conda-firewall
//!
//! This module provides middleware for:
//! - Request/response logging
//! - Per-request tracing spans

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Logging middleware function
///
/// Logs request and response details including:
/// - Method and path
/// - Status code
/// - Response time
/// - User agent
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        user_agent = %user_agent,
        "Request completed"
    );

    response
}

/// Tracing middleware function
///
/// Wraps the whole request in an `http_request` span so that log lines
/// emitted by handlers carry the method and URL.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "http_request",
        http.method = %method,
        http.url = %uri,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;

        // Record status code within the span
        tracing::Span::current().record("http.status_code", response.status().as_u16());

        response
    }
    .instrument(span)
    .await
}
