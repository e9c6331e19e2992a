use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Logs method, path and both bodies at debug; status and latency at info.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(%method, path, error = %e, "request body rejected");
            return ApiError::bad_request(format!("unreadable request body: {e}")).into_response();
        }
    };
    tracing::debug!(%method, path, body = %String::from_utf8_lossy(&bytes), "request");

    let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => return ApiError::internal(format!("failed to buffer response: {e}")).into_response(),
    };
    tracing::debug!(%method, path, body = %String::from_utf8_lossy(&bytes), "response");
    tracing::info!(
        %method,
        path,
        status = parts.status.as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "handled request"
    );
    Response::from_parts(parts, Body::from(bytes))
}
