#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use localqa_core::config::PipelineConfig;
use localqa_core::traits::{GenerationEngine, VectorIndex};
use localqa_core::transcript::Transcript;
use localqa_core::types::{GenerationResult, PassageVector, Prompt, RankedPassage};
use localqa_core::{Error, Result};
use localqa_embed::{FakeEmbedder, FAKE_EMBEDDING_DIM};
use localqa_pipeline::AnswerPipeline;
use localqa_vector::Retriever;

/// Replays fixed chunks and records every prompt it receives.
pub struct ScriptedEngine {
    pub chunks: Vec<String>,
    pub context_window: usize,
    pub max_tokens: usize,
    pub fail_with: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            context_window: 1000,
            max_tokens: 256,
            fail_with: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().expect("lock").last().cloned().unwrap_or_default()
    }
}

impl GenerationEngine for ScriptedEngine {
    fn backend_name(&self) -> &'static str { "Scripted" }
    fn context_window(&self) -> usize { self.context_window }
    fn max_tokens(&self) -> usize { self.max_tokens }

    fn generate(&self, prompt: &Prompt, sink: Option<&mut dyn FnMut(&str)>) -> Result<GenerationResult> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        let mut transcript = Transcript::new(sink);
        for (i, chunk) in self.chunks.iter().enumerate() {
            if let Some(msg) = &self.fail_with {
                if i == 1 {
                    return Err(Error::GenerationAborted(msg.clone()));
                }
            }
            transcript.push(chunk);
        }
        Ok(transcript.finish(true))
    }
}

/// Returns the stored passages with fixed scores whatever the query.
pub struct FixedIndex {
    pub hits: Vec<(PassageVector, f32)>,
}

impl VectorIndex for FixedIndex {
    fn dim(&self) -> usize { FAKE_EMBEDDING_DIM }
    fn len(&self) -> Result<usize> { Ok(self.hits.len()) }
    fn search_vec(&self, _query_vec: &[f32], k: usize) -> Result<Vec<RankedPassage>> {
        Ok(self
            .hits
            .iter()
            .take(k)
            .enumerate()
            .map(|(rank, (passage, score))| RankedPassage { passage: passage.clone(), rank, score: *score })
            .collect())
    }
}

/// Three passages with descending scores: doc1 0.92, doc2 0.81, doc3 0.40.
pub fn reference_index() -> FixedIndex {
    FixedIndex {
        hits: vec![
            (PassageVector::new("doc1:0", "doc1.txt", "X is the twenty-fourth letter of the alphabet.", vec![]), 0.92),
            (PassageVector::new("doc2:0", "doc2.txt", "X comes after W and before Y.", vec![]), 0.81),
            (PassageVector::new("doc3:0", "doc3.txt", "Boats float on water.", vec![]), 0.40),
        ],
    }
}

pub fn config_with_top_k(top_k: usize) -> PipelineConfig {
    PipelineConfig { target_source_chunks: top_k, use_fake_embeddings: true, ..PipelineConfig::default() }
}

pub fn pipeline(engine: Arc<ScriptedEngine>, config: &PipelineConfig) -> AnswerPipeline {
    let retriever = Retriever::new(Box::new(FakeEmbedder::new(FAKE_EMBEDDING_DIM)), Box::new(reference_index())).expect("retriever");
    AnswerPipeline::new(retriever, engine, config)
}
