//! Personalized feed: folds a user's preference vector with their recent
//! likes, bookmarks and dislikes, and explains what drove a recommendation.

use rayon::prelude::*;

use super::{RankError, RankFilter, RankingEngine};
use crate::{
    config::{FeedWeights, RankingConfig},
    embedding::{dot, EmbeddingStore},
    programs::{Category, LikeStatus, ProgramView},
    users::UserRecord,
};

/// One ranked program of a cached feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: u64,
    /// Percent of the score explained by recent likes.
    pub like_contribution: i32,
    /// Percent of the score explained by recent bookmarks.
    pub bookmark_contribution: i32,
}

/// The vectors a feed is ranked and explained with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedVectors {
    pub ranking: Option<Vec<f32>>,
    pub without_see_less: Option<Vec<f32>>,
    pub likes: Option<Vec<f32>>,
    pub bookmarks: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct FeedComposer {
    weights: FeedWeights,
    recent_limit: usize,
    reason_ratio: f32,
}

impl FeedComposer {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            weights: config.weights,
            recent_limit: config.recent_reaction_limit,
            reason_ratio: config.reason_ratio,
        }
    }

    fn average(&self, store: &dyn EmbeddingStore, ids: &[u64]) -> Result<Option<Vec<f32>>, RankError> {
        let mut sum = vec![0.0f32; store.dimensions()];
        let mut count = 0usize;

        for id in ids {
            let Some(embedding) = store.embedding(*id)? else {
                continue;
            };
            sum.iter_mut().zip(&embedding).for_each(|(acc, v)| *acc += v);
            count += 1;
        }

        if count == 0 {
            return Ok(None);
        }

        sum.iter_mut().for_each(|v| *v /= count as f32);
        Ok(Some(sum))
    }

    /// `wU·user + wL·likes + wB·bookmarks − wS·seeLess`, absent parts count as zero.
    pub fn compose(&self, store: &dyn EmbeddingStore, record: &UserRecord) -> Result<FeedVectors, RankError> {
        let dimensions = store.dimensions();

        let user = match &record.preference {
            Some(p) if p.len() != dimensions => {
                return Err(RankError::DimensionMismatch {
                    expected: dimensions,
                    got: p.len(),
                })
            }
            other => other.clone(),
        };

        let likes = self.average(store, &record.recent_reactions(LikeStatus::Like, self.recent_limit))?;
        let bookmarks = self.average(store, &record.recent_bookmarks(self.recent_limit))?;
        let see_less = self.average(store, &record.recent_reactions(LikeStatus::Dislike, self.recent_limit))?;

        let w = self.weights;
        let positive = [(&user, w.user), (&likes, w.likes), (&bookmarks, w.bookmarks)];

        let without_see_less = weighted_sum(dimensions, &positive);
        let ranking = match (&without_see_less, &see_less) {
            (None, None) => None,
            (base, see_less) => {
                let mut ranking = base.clone().unwrap_or_else(|| vec![0.0; dimensions]);
                if let Some(see_less) = see_less {
                    ranking
                        .iter_mut()
                        .zip(see_less)
                        .for_each(|(acc, v)| *acc -= w.see_less * v);
                }
                Some(ranking)
            }
        };

        Ok(FeedVectors {
            ranking,
            without_see_less,
            likes,
            bookmarks,
        })
    }

    /// Rank the catalog for `record` and attach each program's contributions.
    pub fn build(
        &self,
        engine: &RankingEngine,
        record: &UserRecord,
        category: Option<Category>,
    ) -> Result<Vec<FeedEntry>, RankError> {
        let vectors = self.compose(engine.store(), record)?;
        let filter = RankFilter {
            category,
            eligibility: Some(&record.profile),
        };
        let ids = engine.ranked(vectors.ranking.as_deref(), &filter)?;

        let (Some(base), true) = (
            vectors.without_see_less.as_ref(),
            vectors.likes.is_some() || vectors.bookmarks.is_some(),
        ) else {
            return Ok(ids
                .into_iter()
                .map(|id| FeedEntry {
                    id,
                    like_contribution: 0,
                    bookmark_contribution: 0,
                })
                .collect());
        };

        let store = engine.store();
        let w = self.weights;
        ids.into_par_iter()
            .map(|id| -> Result<FeedEntry, RankError> {
                let Some(embedding) = store.embedding(id)? else {
                    return Ok(FeedEntry {
                        id,
                        like_contribution: 0,
                        bookmark_contribution: 0,
                    });
                };

                let denominator = dot(&embedding, base);
                let multiplier = if denominator != 0.0 { 100.0 / denominator } else { 0.0 };
                let contribution = |part: &Option<Vec<f32>>, weight: f32| {
                    part.as_ref()
                        .map_or(0, |v| (weight * dot(&embedding, v) * multiplier).round() as i32)
                };

                Ok(FeedEntry {
                    id,
                    like_contribution: contribution(&vectors.likes, w.likes),
                    bookmark_contribution: contribution(&vectors.bookmarks, w.bookmarks),
                })
            })
            .collect()
    }

    /// Attach reasons to at most `floor(len · reasonRatio)` items per kind,
    /// skipping items the user already bookmarked or reacted to.
    pub fn explain(&self, entries: &[FeedEntry], views: &mut [ProgramView]) {
        let target = (views.len() as f32 * self.reason_ratio) as usize;
        if target == 0 {
            return;
        }

        let candidates: Vec<(usize, &FeedEntry)> = entries
            .iter()
            .enumerate()
            .filter(|(idx, entry)| {
                views
                    .get(*idx)
                    .is_some_and(|v| v.id() == entry.id && !v.is_bookmarked && v.like_status.is_none())
            })
            .collect();

        let mut by_likes: Vec<_> = candidates
            .iter()
            .filter(|(_, e)| e.like_contribution as f32 >= self.weights.likes * 100.0)
            .collect();
        by_likes.sort_by(|a, b| b.1.like_contribution.cmp(&a.1.like_contribution));

        for (idx, entry) in by_likes.into_iter().take(target) {
            views[*idx].reason = Some(format!(
                "Recommended based on your likes ({}%)",
                entry.like_contribution
            ));
        }

        let mut by_bookmarks: Vec<_> = candidates
            .iter()
            .filter(|(idx, e)| {
                views[*idx].reason.is_none() && e.bookmark_contribution as f32 >= self.weights.bookmarks * 100.0
            })
            .collect();
        by_bookmarks.sort_by(|a, b| b.1.bookmark_contribution.cmp(&a.1.bookmark_contribution));

        for (idx, entry) in by_bookmarks.into_iter().take(target) {
            views[*idx].reason = Some(format!(
                "Recommended based on your bookmarks ({}%)",
                entry.bookmark_contribution
            ));
        }
    }
}

fn weighted_sum(dimensions: usize, parts: &[(&Option<Vec<f32>>, f32)]) -> Option<Vec<f32>> {
    let mut sum: Option<Vec<f32>> = None;

    for (part, weight) in parts {
        let Some(v) = part else {
            continue;
        };
        let acc = sum.get_or_insert_with(|| vec![0.0; dimensions]);
        acc.iter_mut().zip(v).for_each(|(a, x)| *a += weight * x);
    }

    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProgramCatalog;
    use crate::embedding::{MemoryStore, Similarity};
    use crate::programs::{Eligibility, OperatingEntityType, Program};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn program(id: u64) -> Program {
        Program {
            id,
            uuid: format!("p-{id}"),
            category: Category::Cash,
            title: format!("program {id}"),
            summary: String::new(),
            details: String::new(),
            preview: String::new(),
            operating_entity: String::new(),
            operating_entity_type: OperatingEntityType::Local,
            application_method: None,
            apply_url: None,
            reference_url: None,
            eligibility: Eligibility::default(),
            apply_start_at: None,
            apply_end_at: None,
            created_at: DateTime::from_timestamp(id as i64, 0).unwrap(),
        }
    }

    fn setup() -> (RankingEngine, FeedComposer) {
        let store = MemoryStore::empty(2, Similarity::Dot);
        store.insert(1, vec![1.0, 0.0]).unwrap();
        store.insert(2, vec![0.0, 1.0]).unwrap();
        store.insert(3, vec![0.8, 0.6]).unwrap();
        store.insert(4, vec![0.6, 0.8]).unwrap();

        let catalog = ProgramCatalog::new((1..=4).map(program).collect(), vec![]).unwrap();
        let engine = RankingEngine::new(catalog, Arc::new(store));
        (engine, FeedComposer::new(&RankingConfig::default()))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_compose_formula() {
        let (engine, composer) = setup();
        let mut record = UserRecord {
            preference: Some(vec![1.0, 0.0]),
            ..Default::default()
        };
        record.bookmarks.insert(2, at(1));
        record.reactions.insert(
            1,
            crate::users::Reaction {
                status: LikeStatus::Dislike,
                at: at(2),
            },
        );

        let vectors = composer.compose(engine.store(), &record).unwrap();

        // 0.3·(1,0) + 0.2·(0,1) - 0.3·(1,0)
        let ranking = vectors.ranking.unwrap();
        assert!(ranking[0].abs() < 1e-6);
        assert!((ranking[1] - 0.2).abs() < 1e-6);

        let base = vectors.without_see_less.unwrap();
        assert!((base[0] - 0.3).abs() < 1e-6);
        assert!(vectors.likes.is_none());
        assert_eq!(vectors.bookmarks, Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_nothing_known_falls_back_to_recency() {
        let (engine, composer) = setup();
        let entries = composer.build(&engine, &UserRecord::default(), None).unwrap();

        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
        assert!(entries.iter().all(|e| e.like_contribution == 0));
    }

    #[test]
    fn test_build_ranks_by_likes() {
        let (engine, composer) = setup();
        let mut record = UserRecord::default();
        record.reactions.insert(
            2,
            crate::users::Reaction {
                status: LikeStatus::Like,
                at: at(1),
            },
        );

        let entries = composer.build(&engine, &record, None).unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);

        // only likes contribute, so every embedded non-orthogonal item is fully explained by them
        assert_eq!(entries[0].like_contribution, 100);
        assert_eq!(entries[1].like_contribution, 100);
        assert_eq!(entries[3].like_contribution, 0);
    }

    #[test]
    fn test_explain_respects_ratio_and_user_state() {
        let composer = FeedComposer::new(&RankingConfig::default());

        let entries: Vec<FeedEntry> = (1..=20)
            .map(|id| FeedEntry {
                id,
                like_contribution: if id <= 3 { 50 + id as i32 } else { 0 },
                bookmark_contribution: if id == 5 { 40 } else { 0 },
            })
            .collect();

        let mut views: Vec<ProgramView> = (1..=20)
            .map(|id| ProgramView::new(program(id), false, None))
            .collect();
        views[2].is_bookmarked = true;

        composer.explain(&entries, &mut views);

        // floor(20 · 0.1) = 2 per kind, item 3 is already bookmarked
        assert_eq!(views[1].reason.as_deref(), Some("Recommended based on your likes (52%)"));
        assert_eq!(views[0].reason.as_deref(), Some("Recommended based on your likes (51%)"));
        assert_eq!(views[2].reason, None);
        assert_eq!(views[4].reason.as_deref(), Some("Recommended based on your bookmarks (40%)"));
        assert_eq!(views.iter().filter(|v| v.reason.is_some()).count(), 3);
    }

    #[test]
    fn test_explain_small_page_gets_nothing() {
        let composer = FeedComposer::new(&RankingConfig::default());
        let entries = vec![FeedEntry {
            id: 1,
            like_contribution: 100,
            bookmark_contribution: 100,
        }];
        let mut views = vec![ProgramView::new(program(1), false, None)];

        composer.explain(&entries, &mut views);
        assert_eq!(views[0].reason, None);
    }
}
