//! In-memory program embedding index.

use std::collections::HashMap;
use std::sync::RwLock;

use rayon::prelude::*;

use super::{l2_norm, EmbeddingStore, Scored, Similarity, StoreError};

/// Program id -> embedding, all of one dimension.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: HashMap<u64, Vec<f32>>,
    dimensions: usize,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the embedding of a program.
    ///
    /// Rejects vectors of the wrong dimension and vectors with zero norm.
    pub fn insert(&mut self, id: u64, embedding: Vec<f32>) -> Result<(), IndexError> {
        self.check_dimensions(&embedding)?;

        if l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.insert(id, embedding);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<&[f32]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> {
        self.entries.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn bulk_load(&mut self, entries: Vec<(u64, Vec<f32>)>) -> Result<(), IndexError> {
        for (id, embedding) in entries {
            self.insert(id, embedding)?;
        }
        Ok(())
    }

    fn check_dimensions(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: v.len(),
            });
        }
        Ok(())
    }

    /// Score every accepted entry against `query`, highest first, ties by id.
    pub fn search(
        &self,
        query: &[f32],
        similarity: Similarity,
        filter: &(dyn Fn(u64) -> bool + Sync),
        limit: usize,
    ) -> Result<Vec<Scored>, IndexError> {
        self.check_dimensions(query)?;

        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<Scored> = self
            .entries
            .par_iter()
            .filter(|(id, _)| filter(**id))
            .map(|(id, embedding)| Scored {
                id: *id,
                score: similarity.score(query, query_norm, embedding),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        results.truncate(limit);

        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding has {got} dimensions, index holds {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("zero-norm vector has no direction to rank by")]
    ZeroNormVector,
}

/// Thread-safe [`EmbeddingStore`] over a [`VectorIndex`].
pub struct MemoryStore {
    index: RwLock<VectorIndex>,
    similarity: Similarity,
}

impl MemoryStore {
    pub fn new(index: VectorIndex, similarity: Similarity) -> Self {
        Self {
            index: RwLock::new(index),
            similarity,
        }
    }

    pub fn empty(dimensions: usize, similarity: Similarity) -> Self {
        Self::new(VectorIndex::new(dimensions), similarity)
    }

    pub fn insert(&self, id: u64, embedding: Vec<f32>) -> Result<(), StoreError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| StoreError::Unavailable("index lock poisoned".to_string()))?;
        index.insert(id, embedding)?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, VectorIndex>, StoreError> {
        self.index
            .read()
            .map_err(|_| StoreError::Unavailable("index lock poisoned".to_string()))
    }
}

impl EmbeddingStore for MemoryStore {
    fn dimensions(&self) -> usize {
        self.read().map(|index| index.dimensions()).unwrap_or_default()
    }

    fn embedding(&self, id: u64) -> Result<Option<Vec<f32>>, StoreError> {
        Ok(self.read()?.get(id).map(<[f32]>::to_vec))
    }

    fn nearest_by(
        &self,
        query: &[f32],
        filter: &(dyn Fn(u64) -> bool + Sync),
        limit: usize,
    ) -> Result<Vec<Scored>, StoreError> {
        let index = self.read()?;
        Ok(index.search(query, self.similarity, filter, limit)?)
    }
}
