//! Onboarding ratings -> user preference vector.

use std::collections::HashMap;

use super::normalize;
use crate::programs::Rating;

const NEUTRAL_SCORE: f32 = 3.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreferenceError {
    #[error("every example program needs a score between 1 and 5")]
    IncompleteRatings,

    #[error("program {0} is not an example program")]
    UnknownExample(u64),

    #[error("example program {0} has no embedding")]
    MissingEmbedding(u64),

    #[error("example embedding of program {id} has {got} dimensions, expected {expected}")]
    DimensionMismatch { id: u64, expected: usize, got: usize },
}

/// Fold example ratings into one unit-length preference vector.
///
/// `examples` maps every example program id to its embedding, if it has one.
/// Each embedding is weighted by `score - 3`, so neutral ratings contribute
/// nothing and an all-neutral submission yields the zero vector.
pub fn aggregate(
    ratings: &[Rating],
    examples: &HashMap<u64, Option<Vec<f32>>>,
    dimensions: usize,
) -> Result<Vec<f32>, PreferenceError> {
    let mut scores: HashMap<u64, u8> = HashMap::with_capacity(ratings.len());
    for rating in ratings {
        if !examples.contains_key(&rating.id) {
            return Err(PreferenceError::UnknownExample(rating.id));
        }
        scores.insert(rating.id, rating.score);
    }

    let complete = examples
        .keys()
        .all(|id| scores.get(id).is_some_and(|score| (1..=5).contains(score)));
    if !complete {
        return Err(PreferenceError::IncompleteRatings);
    }

    // deterministic summation order
    let mut ids: Vec<u64> = examples.keys().copied().collect();
    ids.sort_unstable();

    let mut preference = vec![0.0f32; dimensions];
    for id in ids {
        let embedding = examples
            .get(&id)
            .and_then(Option::as_ref)
            .ok_or(PreferenceError::MissingEmbedding(id))?;

        if embedding.len() != dimensions {
            return Err(PreferenceError::DimensionMismatch {
                id,
                expected: dimensions,
                got: embedding.len(),
            });
        }

        let weight = scores[&id] as f32 - NEUTRAL_SCORE;
        if weight == 0.0 {
            continue;
        }

        preference
            .iter_mut()
            .zip(embedding)
            .for_each(|(acc, value)| *acc += weight * value);
    }

    normalize(&mut preference);
    Ok(preference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{is_zero_norm, l2_norm};

    fn examples() -> HashMap<u64, Option<Vec<f32>>> {
        HashMap::from([
            (1, Some(vec![1.0, 0.0, 0.0])),
            (2, Some(vec![0.0, 1.0, 0.0])),
            (3, Some(vec![0.0, 0.0, 1.0])),
        ])
    }

    fn rate(scores: &[(u64, u8)]) -> Vec<Rating> {
        scores.iter().map(|&(id, score)| Rating { id, score }).collect()
    }

    #[test]
    fn test_missing_score_is_incomplete() {
        let result = aggregate(&rate(&[(1, 5), (2, 4)]), &examples(), 3);
        assert_eq!(result, Err(PreferenceError::IncompleteRatings));
    }

    #[test]
    fn test_unset_or_out_of_range_is_incomplete() {
        let result = aggregate(&rate(&[(1, 5), (2, 0), (3, 1)]), &examples(), 3);
        assert_eq!(result, Err(PreferenceError::IncompleteRatings));

        let result = aggregate(&rate(&[(1, 6), (2, 3), (3, 1)]), &examples(), 3);
        assert_eq!(result, Err(PreferenceError::IncompleteRatings));
    }

    #[test]
    fn test_unknown_example() {
        let result = aggregate(&rate(&[(1, 5), (2, 3), (3, 1), (42, 5)]), &examples(), 3);
        assert_eq!(result, Err(PreferenceError::UnknownExample(42)));
    }

    #[test]
    fn test_missing_embedding() {
        let mut examples = examples();
        examples.insert(2, None);

        let result = aggregate(&rate(&[(1, 5), (2, 3), (3, 1)]), &examples, 3);
        assert_eq!(result, Err(PreferenceError::MissingEmbedding(2)));
    }

    #[test]
    fn test_weighted_centroid() {
        let v = aggregate(&rate(&[(1, 5), (2, 3), (3, 1)]), &examples(), 3).unwrap();

        // (+2, 0, -2) normalized
        let expected = 1.0 / 2.0f32.sqrt();
        assert!((v[0] - expected).abs() < 1e-6);
        assert_eq!(v[1], 0.0);
        assert!((v[2] + expected).abs() < 1e-6);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_all_neutral_is_zero_vector() {
        let v = aggregate(&rate(&[(1, 3), (2, 3), (3, 3)]), &examples(), 3).unwrap();
        assert_eq!(v.len(), 3);
        assert!(is_zero_norm(&v));
    }
}
