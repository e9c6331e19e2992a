use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use localqa_core::Error;

/// JSON error body: `{"error": message, "kind": kind}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, body: ErrorBody { error: message.into(), kind: "bad_request".into() } }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, body: ErrorBody { error: message.into(), kind: "internal".into() } }
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Encoding(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::GenerationAborted(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self { status: status_for(&err), body: ErrorBody { error: err.to_string(), kind: err.kind().to_string() } }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
