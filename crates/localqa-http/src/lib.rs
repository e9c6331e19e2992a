//! localqa-http
//!
//! HTTP front end for the answer pipeline:
//! - `POST /api/qa` answers one question
//! - `GET /health` reports liveness and the active backend

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use localqa_pipeline::AnswerPipeline;

pub mod error;
pub mod handlers;
pub mod middleware;

pub use error::{status_for, ApiError, ErrorBody};
pub use handlers::{QaRequest, QaResponse};

/// Shared by every request; the pipeline is built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnswerPipeline>,
    /// Config default; a request can only narrow it with `hide_source`.
    pub include_sources: bool,
}

impl AppState {
    pub fn new(pipeline: Arc<AnswerPipeline>, include_sources: bool) -> Self {
        Self { pipeline, include_sources }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/qa", post(handlers::qa_handler))
        .route("/health", get(handlers::health_handler))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .with_state(state)
}
