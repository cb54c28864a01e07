//! Similarity ranking of the catalog against a preference vector.

pub mod cache;
pub mod feed;

use std::{collections::HashMap, collections::HashSet, sync::Arc};

use rayon::prelude::*;

use crate::{
    catalog::ProgramCatalog,
    embedding::{is_zero_norm, EmbeddingStore, IndexError, StoreError},
    programs::{Category, Page, PageRequest, Program, UserProfile},
    search::by_recency,
};

pub use cache::FeedCache;
pub use feed::{FeedComposer, FeedEntry};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RankError {
    #[error("embedding store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("preference vector has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl From<StoreError> for RankError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Index(IndexError::DimensionMismatch { expected, got }) => {
                RankError::DimensionMismatch { expected, got }
            }
            other => RankError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Candidate restrictions. Unknown profile facts never exclude.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankFilter<'a> {
    pub category: Option<Category>,
    pub eligibility: Option<&'a UserProfile>,
}

impl RankFilter<'_> {
    pub fn accepts(&self, program: &Program) -> bool {
        self.category.map_or(true, |c| program.category == c)
            && self
                .eligibility
                .map_or(true, |profile| program.eligibility.admits(profile))
    }
}

#[derive(Clone)]
pub struct RankingEngine {
    catalog: ProgramCatalog,
    store: Arc<dyn EmbeddingStore>,
}

impl RankingEngine {
    pub fn new(catalog: ProgramCatalog, store: Arc<dyn EmbeddingStore>) -> Self {
        Self { catalog, store }
    }

    pub fn store(&self) -> &dyn EmbeddingStore {
        self.store.as_ref()
    }

    pub fn catalog(&self) -> &ProgramCatalog {
        &self.catalog
    }

    /// Ordered ids of every accepted program.
    ///
    /// Highest similarity first, then newest, then lowest id. Programs
    /// without an embedding come after all embedded ones. An absent or
    /// zero preference falls back to recency.
    pub fn ranked(&self, preference: Option<&[f32]>, filter: &RankFilter) -> Result<Vec<u64>, RankError> {
        let mut candidates: Vec<&Program> = self
            .catalog
            .all()
            .par_iter()
            .filter(|p| filter.accepts(p))
            .collect();

        let preference = match preference {
            Some(p) if !is_zero_norm(p) => p,
            _ => {
                log::debug!("no usable preference vector, ranking {} programs by recency", candidates.len());
                candidates.par_sort_by(|a, b| by_recency(a, b));
                return Ok(candidates.into_iter().map(|p| p.id).collect());
            }
        };

        let expected = self.store.dimensions();
        if preference.len() != expected {
            return Err(RankError::DimensionMismatch {
                expected,
                got: preference.len(),
            });
        }

        let ids: HashSet<u64> = candidates.iter().map(|p| p.id).collect();
        let scores: HashMap<u64, f32> = self
            .store
            .nearest_by(preference, &|id| ids.contains(&id), ids.len())?
            .into_iter()
            .map(|hit| (hit.id, hit.score))
            .collect();

        let score_of = |p: &Program| scores.get(&p.id).copied().unwrap_or(f32::NEG_INFINITY);
        candidates.par_sort_by(|a, b| {
            score_of(b)
                .total_cmp(&score_of(a))
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });

        Ok(candidates.into_iter().map(|p| p.id).collect())
    }

    pub fn rank(
        &self,
        preference: Option<&[f32]>,
        filter: &RankFilter,
        request: PageRequest,
    ) -> Result<Page<Program>, RankError> {
        let ids = self.ranked(preference, filter)?;
        Ok(self.page_of(&ids, request))
    }

    /// Resolve one page of an ordered id list.
    pub fn page_of(&self, ids: &[u64], request: PageRequest) -> Page<Program> {
        let programs: Vec<&Program> = ids.iter().filter_map(|id| self.catalog.get(*id)).collect();
        Page::paginate(programs.into_iter().cloned(), request)
    }
}
