use crate::error::Result;
use crate::types::{GenerationResult, Prompt, RankedPassage};

/// Maps text into the vector space of the index.
pub trait Embedder: Send + Sync {
    /// Identifier of the model (and normalisation) producing the vectors.
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// Read-only nearest-neighbour search over stored passages.
///
/// Results are best first with 0-based ranks; equal scores keep index
/// insertion order.
pub trait VectorIndex: Send + Sync {
    fn dim(&self) -> usize;
    fn len(&self) -> Result<usize>;
    fn is_empty(&self) -> Result<bool> { Ok(self.len()? == 0) }
    fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<RankedPassage>>;
    /// `Embedder::embedder_id` of the encoder that built the index, when it was recorded.
    fn recorded_embedder(&self) -> Option<&str> { None }
}

/// A local text-generation runtime.
///
/// When `sink` is given it receives every produced chunk, in order, before
/// `generate` returns; the returned `answer_text` is their concatenation.
pub trait GenerationEngine: Send + Sync {
    fn backend_name(&self) -> &'static str;
    fn context_window(&self) -> usize;
    fn max_tokens(&self) -> usize;
    fn count_tokens(&self, text: &str) -> usize { estimate_tokens(text) }
    fn generate(&self, prompt: &Prompt, sink: Option<&mut dyn FnMut(&str)>) -> Result<GenerationResult>;
}

/// Rough token count for engines without a local tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f32 / 0.75).ceil() as usize
}
