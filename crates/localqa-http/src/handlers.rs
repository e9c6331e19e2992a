use std::io::Write;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;

use localqa_pipeline::{Answer, AnswerOptions, AnswerPipeline};

use crate::error::ApiError;
use crate::AppState;

/// Body of `POST /api/qa`. Unknown fields are ignored and a missing or
/// non-string `query` is treated as the empty query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaRequest {
    pub query: String,
    pub hide_source: bool,
    pub mute_stream: bool,
}

impl QaRequest {
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?;
        let Some(obj) = value.as_object() else {
            return Err(ApiError::bad_request("request body must be a JSON object"));
        };
        let flag = |key: &str| obj.get(key).and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            query: obj.get("query").and_then(Value::as_str).unwrap_or_default().to_string(),
            hide_source: flag("hide_source"),
            mute_stream: flag("mute_stream"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceMetadata {
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDocument {
    pub metadata: SourceMetadata,
    pub page_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaResponse {
    pub query: String,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<SourceDocument>>,
}

impl QaResponse {
    pub fn from_answer(answer: Answer, include_sources: bool) -> Self {
        let source_documents = include_sources.then(|| {
            answer
                .citations
                .into_iter()
                .map(|c| SourceDocument { metadata: SourceMetadata { source: c.source }, page_content: c.text })
                .collect()
        });
        Self { query: answer.query, result: answer.result, source_documents }
    }
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "backend": state.pipeline.engine().backend_name()}))
}

/// Answer `query`, writing streamed chunks to `out` as they arrive. The echo
/// is closed with a newline only if at least one chunk was written.
pub fn answer_echoing<W: Write>(
    pipeline: &AnswerPipeline,
    query: &str,
    options: AnswerOptions,
    out: &mut W,
) -> localqa_core::Result<Answer> {
    let mut streamed = false;
    let answer = {
        let mut echo = |chunk: &str| {
            streamed = true;
            let _ = out.write_all(chunk.as_bytes());
            let _ = out.flush();
        };
        pipeline.answer(query, options, Some(&mut echo))
    };
    if streamed {
        let _ = out.write_all(b"\n");
        let _ = out.flush();
    }
    answer
}

/// Answer one question. Generation runs on the blocking pool; streamed
/// tokens are echoed to the server's stdout as they arrive, holding the
/// stdout lock so concurrent answers do not interleave.
pub async fn qa_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match QaRequest::parse(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e.body.error, "rejected /api/qa request");
            return e.into_response();
        }
    };
    let include_sources = state.include_sources && !request.hide_source;
    let options = AnswerOptions { include_sources, mute_stream: request.mute_stream };
    let pipeline = state.pipeline.clone();
    let query = request.query;

    let joined = tokio::task::spawn_blocking(move || {
        if pipeline.streams(&options) {
            let mut stdout = std::io::stdout().lock();
            answer_echoing(&pipeline, &query, options, &mut stdout)
        } else {
            pipeline.answer(&query, options, None)
        }
    })
    .await;

    match joined {
        Ok(Ok(answer)) => Json(QaResponse::from_answer(answer, include_sources)).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, kind = e.kind(), "question failed");
            ApiError::from(e).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "answer task panicked");
            ApiError::internal(format!("answer task failed: {e}")).into_response()
        }
    }
}
