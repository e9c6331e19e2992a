//! Exact in-memory index. Used for small corpora and as the reference
//! behaviour the LanceDB index is tested against.

use localqa_core::config::DistanceMetric;
use localqa_core::traits::VectorIndex;
use localqa_core::types::{PassageVector, RankedPassage};
use localqa_core::{Error, Result};

pub struct FlatIndex {
    passages: Vec<PassageVector>,
    dim: usize,
    metric: DistanceMetric,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: DistanceMetric) -> Self {
        Self { passages: Vec::new(), dim, metric }
    }

    pub fn from_passages(dim: usize, metric: DistanceMetric, passages: impl IntoIterator<Item = PassageVector>) -> Result<Self> {
        let mut index = Self::new(dim, metric);
        for p in passages {
            index.insert(p)?;
        }
        Ok(index)
    }

    pub fn insert(&mut self, passage: PassageVector) -> Result<()> {
        if passage.vector.len() != self.dim {
            return Err(Error::IndexUnavailable(format!(
                "passage '{}' has {} dims, index has {}",
                passage.id,
                passage.vector.len(),
                self.dim
            )));
        }
        self.passages.push(passage);
        Ok(())
    }

    fn score(&self, query: &[f32], v: &[f32]) -> f32 {
        let s = match self.metric {
            DistanceMetric::Cosine => {
                let qn = norm(query);
                let vn = norm(v);
                if qn == 0.0 || vn == 0.0 { 0.0 } else { dot(query, v) / (qn * vn) }
            }
            DistanceMetric::Dot => dot(query, v),
            DistanceMetric::L2 => -query.iter().zip(v).map(|(a, b)| (a - b) * (a - b)).sum::<f32>(),
        };
        if s.is_nan() { f32::NEG_INFINITY } else { s }
    }
}

impl VectorIndex for FlatIndex {
    fn dim(&self) -> usize { self.dim }
    fn len(&self) -> Result<usize> { Ok(self.passages.len()) }

    fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<RankedPassage>> {
        if query_vec.len() != self.dim {
            return Err(Error::Encoding(format!("query vector has {} values, index expects {}", query_vec.len(), self.dim)));
        }
        let mut scored: Vec<(usize, f32)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(i, p)| (i, self.score(query_vec, &p.vector)))
            .collect();
        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored
            .into_iter()
            .take(k.max(1))
            .enumerate()
            .map(|(rank, (i, score))| RankedPassage { passage: self.passages[i].clone(), rank, score })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }
fn norm(a: &[f32]) -> f32 { dot(a, a).sqrt() }
