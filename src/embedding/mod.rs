//! Program embeddings: the similarity store, its on-disk form and the
//! preference aggregator that turns onboarding ratings into a user vector.

pub mod index;
pub mod preference;
pub mod storage;

use serde::{Deserialize, Serialize};

pub use index::{IndexError, MemoryStore, VectorIndex};
pub use preference::{aggregate, PreferenceError};
pub use storage::{model_id_hash, VectorStorage, VectorStorageError};

/// Similarity metric between a query vector and a program embedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Similarity {
    /// Plain dot product, the deployment ships unit-length embeddings.
    #[default]
    Dot,
    Cosine,
}

impl Similarity {
    pub fn score(self, query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
        match self {
            Similarity::Dot => dot(query, target),
            Similarity::Cosine => {
                let target_norm = l2_norm(target);
                if target_norm < f32::EPSILON || query_norm < f32::EPSILON {
                    return 0.0;
                }
                dot(query, target) / (query_norm * target_norm)
            }
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn is_zero_norm(v: &[f32]) -> bool {
    l2_norm(v) < f32::EPSILON
}

/// Scale `v` to unit length in place. Zero vectors are left alone.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm >= f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// One similarity hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub id: u64,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("embedding store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Query contract of the program embedding store.
pub trait EmbeddingStore: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embedding(&self, id: u64) -> Result<Option<Vec<f32>>, StoreError>;

    /// Best matches for `query` among ids accepted by `filter`, highest score first.
    fn nearest_by(
        &self,
        query: &[f32],
        filter: &(dyn Fn(u64) -> bool + Sync),
        limit: usize,
    ) -> Result<Vec<Scored>, StoreError>;
}
