//! Ollama streaming backend.
//!
//! `POST /api/generate` with `stream: true` answers with newline-delimited
//! JSON objects, one per token batch, the last carrying `"done": true`.
//! Network chunks do not align with lines, so bytes go through
//! [`NdjsonDecoder`] before being parsed.

use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use localqa_core::config::PipelineConfig;
use localqa_core::traits::GenerationEngine;
use localqa_core::transcript::Transcript;
use localqa_core::types::{GenerationResult, Prompt};
use localqa_core::{Error, Result};

/// Sampling and context options forwarded with every request.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaOptions {
    pub num_ctx: usize,
    pub num_predict: usize,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    pub seed: u64,
    pub repeat_penalty: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a OllamaOptions,
}

/// One line of the streamed response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Splits a byte stream into complete NDJSON lines.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self { Self::default() }

    /// Append `bytes` and parse every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<GenerateChunk>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(chunk) = parse_line(&line[..line.len() - 1])? {
                out.push(chunk);
            }
        }
        Ok(out)
    }

    /// Parse a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Result<Option<GenerateChunk>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<GenerateChunk>> {
    let text = std::str::from_utf8(line).map_err(|e| Error::GenerationAborted(format!("stream is not UTF-8: {e}")))?;
    let trimmed = text.trim();
    if trimmed.is_empty() { return Ok(None); }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| Error::GenerationAborted(format!("malformed stream line: {e}")))
}

pub struct OllamaEngine {
    client: Client,
    base_url: String,
    model: String,
    options: OllamaOptions,
    handle: Handle,
}

impl OllamaEngine {
    /// Connect to the runtime at `ollama_url` and check that `model_path`
    /// names an installed model.
    pub async fn connect(config: &PipelineConfig) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(5));
        if let Some(secs) = config.generation_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| Error::ModelLoad(format!("http client: {e}")))?;
        let base_url = config.ollama_url.trim_end_matches('/').to_string();
        let engine = Self {
            client,
            base_url,
            model: config.model_path.clone(),
            options: OllamaOptions {
                num_ctx: config.model_n_ctx,
                num_predict: config.max_tokens,
                temperature: config.temperature,
                top_p: config.top_p,
                seed: config.seed,
                repeat_penalty: config.repeat_penalty,
            },
            handle: Handle::current(),
        };
        let installed = engine.list_models().await?;
        if !installed.iter().any(|name| tag_matches(name, &engine.model)) {
            return Err(Error::ModelLoad(format!(
                "model '{}' is not installed in Ollama at {} (available: {})",
                engine.model,
                engine.base_url,
                installed.join(", ")
            )));
        }
        tracing::info!(url = %engine.base_url, model = %engine.model, "ollama model available");
        Ok(engine)
    }

    pub fn options(&self) -> &OllamaOptions { &self.options }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ModelLoad(format!("cannot reach Ollama at {}: {}", self.base_url, e)))?;
        if !response.status().is_success() {
            return Err(Error::ModelLoad(format!("GET {} returned {}", url, response.status())));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::ModelLoad(format!("failed to parse model list: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate_stream(&self, prompt: &Prompt, sink: Option<&mut dyn FnMut(&str)>) -> Result<GenerationResult> {
        let started = Instant::now();
        let request = GenerateRequest { model: &self.model, prompt: prompt.as_str(), stream: true, options: &self.options };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(request_failed)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GenerationAborted(format!("Ollama returned {}: {}", status, body.trim())));
        }

        let mut transcript = Transcript::new(sink);
        let mut decoder = NdjsonDecoder::new();
        let mut stream = response.bytes_stream();
        let mut last: Option<GenerateChunk> = None;
        'read: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(request_failed)?;
            for chunk in decoder.push(&bytes)? {
                if apply_chunk(&mut transcript, chunk, &mut last)? { break 'read; }
            }
        }
        if last.is_none() {
            if let Some(chunk) = decoder.finish()? {
                apply_chunk(&mut transcript, chunk, &mut last)?;
            }
        }
        let Some(done) = last else {
            return Err(Error::GenerationAborted("Ollama stream ended before completion".into()));
        };
        let terminated_normally = done.done_reason.as_deref() != Some("length");
        tracing::debug!(chunks = transcript.chunks(), elapsed_ms = started.elapsed().as_millis() as u64, reason = ?done.done_reason, "ollama generation finished");
        Ok(transcript.finish(terminated_normally))
    }
}

/// Push one chunk; returns true once the final chunk has been seen.
fn apply_chunk(transcript: &mut Transcript<'_>, chunk: GenerateChunk, last: &mut Option<GenerateChunk>) -> Result<bool> {
    if let Some(err) = chunk.error.as_deref() {
        return Err(Error::GenerationAborted(format!("Ollama: {err}")));
    }
    transcript.push(&chunk.response);
    if chunk.done {
        *last = Some(chunk);
        return Ok(true);
    }
    Ok(false)
}

fn request_failed(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::GenerationAborted(format!("Ollama request timed out: {e}"))
    } else {
        Error::GenerationAborted(format!("Ollama request failed: {e}"))
    }
}

/// `llama3` matches the installed `llama3:latest`; explicit tags must match exactly.
pub fn tag_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted || (!wanted.contains(':') && installed == format!("{wanted}:latest"))
}

impl GenerationEngine for OllamaEngine {
    fn backend_name(&self) -> &'static str { "Ollama" }
    fn context_window(&self) -> usize { self.options.num_ctx }
    fn max_tokens(&self) -> usize { self.options.num_predict }

    fn generate(&self, prompt: &Prompt, sink: Option<&mut dyn FnMut(&str)>) -> Result<GenerationResult> {
        self.handle.block_on(self.generate_stream(prompt, sink))
    }
}
