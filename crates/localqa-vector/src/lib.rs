//! localqa-vector
//!
//! Read-only passage retrieval: the LanceDB index built offline, an exact
//! in-memory index, and the [`Retriever`] that pairs either with the query
//! encoder.

use localqa_core::config::{DistanceMetric, PipelineConfig};
use localqa_core::traits::VectorIndex;
use localqa_core::Result;

pub mod flat;
pub mod lance;
pub mod retriever;
pub mod schema;
pub mod table;

pub use flat::FlatIndex;
pub use lance::LanceVectorIndex;
pub use retriever::Retriever;

/// Convert a LanceDB `_distance` into a similarity where higher is better.
pub fn similarity_from_distance(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        DistanceMetric::Cosine | DistanceMetric::Dot => 1.0 - distance,
        DistanceMetric::L2 => -distance,
    }
}

/// Open the configured LanceDB table.
pub async fn open_index(config: &PipelineConfig) -> Result<Box<dyn VectorIndex>> {
    Ok(Box::new(LanceVectorIndex::open(config).await?))
}
