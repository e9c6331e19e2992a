use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use localqa_core::config::PipelineConfig;
use localqa_core::traits::GenerationEngine;
use localqa_core::types::{GenerationResult, Meta, RankedPassage};
use localqa_core::Result;
use localqa_generate::{build_engine, BackendKind};
use localqa_vector::Retriever;

use crate::prompt::PromptAssembler;

/// Per-request switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOptions {
    pub include_sources: bool,
    /// Suppress token streaming for this request even when enabled in config.
    pub mute_stream: bool,
}

impl AnswerOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self { include_sources: config.include_sources, mute_stream: false }
    }
}

/// A passage the answer was conditioned on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub source: String,
    pub text: String,
    pub metadata: Meta,
}

impl From<&RankedPassage> for Citation {
    fn from(p: &RankedPassage) -> Self {
        Self { source: p.passage.source().to_string(), text: p.passage.text.clone(), metadata: p.passage.metadata.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerStats {
    pub retrieved: usize,
    pub used: usize,
    pub dropped: usize,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub terminated_normally: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub query: String,
    pub result: String,
    pub citations: Vec<Citation>,
    pub stats: AnswerStats,
}

/// Retrieve, assemble, generate. Built once per process and shared by `Arc`;
/// holds no per-request state.
pub struct AnswerPipeline {
    retriever: Retriever,
    engine: Arc<dyn GenerationEngine>,
    assembler: PromptAssembler,
    top_k: usize,
    stream_tokens: bool,
}

impl AnswerPipeline {
    pub fn new(retriever: Retriever, engine: Arc<dyn GenerationEngine>, config: &PipelineConfig) -> Self {
        let assembler = PromptAssembler::for_engine(engine.as_ref());
        Self { retriever, engine, assembler, top_k: config.top_k(), stream_tokens: config.stream_tokens }
    }

    /// Build every component from config. The backend kind is checked first so
    /// an unsupported `model_type` fails before the encoder or index is loaded.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self> {
        let started = Instant::now();
        let kind: BackendKind = config.model_type.parse()?;
        let embedder = localqa_embed::get_embedder(config)?;
        let index = localqa_vector::open_index(config).await?;
        let retriever = Retriever::new(embedder, index)?;
        let engine = build_engine(config).await?;
        tracing::info!(
            backend = %kind,
            encoder = retriever.embedder().embedder_id(),
            top_k = config.top_k(),
            budget = PromptAssembler::for_engine(engine.as_ref()).budget(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answer pipeline ready"
        );
        Ok(Self::new(retriever, engine, config))
    }

    pub fn engine(&self) -> &dyn GenerationEngine { self.engine.as_ref() }
    pub fn retriever(&self) -> &Retriever { &self.retriever }
    pub fn top_k(&self) -> usize { self.top_k }

    /// Whether `answer` will pass tokens to its sink under these options.
    pub fn streams(&self, options: &AnswerOptions) -> bool { self.stream_tokens && !options.mute_stream }

    /// Answer `query`. Tokens reach `sink` as they are generated unless
    /// streaming is disabled in config or muted for this request.
    pub fn answer(&self, query: &str, options: AnswerOptions, sink: Option<&mut dyn FnMut(&str)>) -> Result<Answer> {
        let started = Instant::now();
        let passages = self.retriever.retrieve(query, self.top_k)?;
        let retrieved = passages.len();
        let retrieval_ms = started.elapsed().as_millis() as u64;

        let assembled = self.assembler.assemble(query, passages, |text| self.engine.count_tokens(text));
        if assembled.dropped > 0 {
            tracing::warn!(dropped = assembled.dropped, budget = self.assembler.budget(), "passages dropped to fit the context window");
        }

        let sink = if self.streams(&options) { sink } else { None };
        let gen_started = Instant::now();
        let GenerationResult { answer_text, terminated_normally } = self
            .engine
            .generate(&assembled.prompt, sink)
            .inspect_err(|e| tracing::error!(query, error = %e, kind = e.kind(), "generation failed"))?;
        let generation_ms = gen_started.elapsed().as_millis() as u64;

        let citations = if options.include_sources {
            assembled.passages.iter().map(Citation::from).collect()
        } else {
            Vec::new()
        };
        let stats = AnswerStats {
            retrieved,
            used: assembled.passages.len(),
            dropped: assembled.dropped,
            retrieval_ms,
            generation_ms,
            terminated_normally,
        };
        tracing::info!(
            query,
            retrieved,
            used = stats.used,
            dropped = stats.dropped,
            retrieval_ms,
            generation_ms,
            terminated_normally,
            "answered"
        );
        Ok(Answer { query: query.to_string(), result: answer_text, citations, stats })
    }
}
