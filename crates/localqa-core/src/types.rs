//! Domain types shared by the encoder, index, engine and pipeline crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type PassageId = String;
pub type Meta = BTreeMap<String, String>;

/// Metadata key every stored passage carries.
pub const SOURCE_KEY: &str = "source";

/// A passage stored in the vector index, created when the index was built.
///
/// - `id`: opaque identifier assigned by the index builder
/// - `text`: the passage content fed to the generator
/// - `metadata`: scalar metadata, at minimum `source`
/// - `vector`: the passage embedding (may be empty when the index does not
///   return stored vectors with search results)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageVector {
    pub id: PassageId,
    pub text: String,
    pub metadata: Meta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
}

impl PassageVector {
    pub fn new(id: impl Into<String>, source: impl Into<String>, text: impl Into<String>, vector: Vec<f32>) -> Self {
        let mut metadata = Meta::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self { id: id.into(), text: text.into(), metadata, vector }
    }

    /// The `source` metadata value, or an empty string if the index never recorded one.
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or("")
    }
}

/// A passage selected for one query.
///
/// `rank` is 0-based, best first. `score` is a similarity: higher is always
/// better regardless of the index distance metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPassage {
    pub passage: PassageVector,
    pub rank: usize,
    pub score: f32,
}

/// The exact text submitted to a generation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self { Self(text.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Output of one completed generation.
///
/// `terminated_normally` is false when generation stopped at the token limit
/// instead of an end-of-sequence marker. Aborted runs are errors, never results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub answer_text: String,
    pub terminated_normally: bool,
}
