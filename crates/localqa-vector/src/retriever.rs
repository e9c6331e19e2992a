use std::time::Instant;

use localqa_core::traits::{Embedder, VectorIndex};
use localqa_core::types::RankedPassage;
use localqa_core::{Error, Result};

/// Query encoder paired with the index it was built for.
pub struct Retriever {
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
}

impl Retriever {
    /// Fails with `IndexUnavailable` when the encoder and index disagree on
    /// the vector width, since no search could succeed. A differing recorded
    /// encoder id only warns.
    pub fn new(embedder: Box<dyn Embedder>, index: Box<dyn VectorIndex>) -> Result<Self> {
        if embedder.dim() != index.dim() {
            return Err(Error::IndexUnavailable(format!(
                "encoder '{}' produces {}-dim vectors but the index stores {}-dim vectors",
                embedder.embedder_id(),
                embedder.dim(),
                index.dim()
            )));
        }
        match index.recorded_embedder() {
            Some(recorded) if recorded != embedder.embedder_id() => tracing::warn!(
                recorded,
                configured = embedder.embedder_id(),
                "index was built with a different encoder; scores may be meaningless"
            ),
            Some(_) => {}
            None => tracing::debug!(configured = embedder.embedder_id(), "no encoder recorded for index"),
        }
        Ok(Self { embedder, index })
    }

    /// `None` when the index recorded no encoder, otherwise whether the
    /// recorded id is exactly this encoder's id.
    pub fn encoder_matches_index(&self) -> Option<bool> {
        self.index.recorded_embedder().map(|recorded| recorded == self.embedder.embedder_id())
    }

    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }
    pub fn index(&self) -> &dyn VectorIndex { self.index.as_ref() }

    /// The `top_k` passages closest to `query`, best first. `top_k` 0 is treated as 1.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RankedPassage>> {
        let top_k = top_k.max(1);
        let started = Instant::now();
        let query_vec = self.embedder.embed_text(query)?;
        let embed_ms = started.elapsed().as_millis() as u64;
        let mut hits = self.index.search_vec(&query_vec, top_k)?;
        hits.truncate(top_k);
        tracing::debug!(top_k, hits = hits.len(), embed_ms, total_ms = started.elapsed().as_millis() as u64, "retrieved passages");
        Ok(hits)
    }
}
