//! Exact brute-force similarity ranking.
//!
//! # Algorithm
//!
//! 1. Score every candidate with the plain inner product `q · v`.
//! 2. Sort candidate *indices* by score, descending. The sort is stable, so
//!    equal scores keep their input order.
//! 3. Walk the sorted indices, skipping scores below `min_score`, until
//!    `top_k` results are collected.
//!
//! # Precondition
//!
//! Scores are raw inner products; no normalization is applied to either
//! vector. They equal cosine similarity only when the embedding provider
//! returns unit-L2-norm vectors for both the catalog and the query. With
//! unnormalized input the ranking is still well defined but scores are no
//! longer bounded by `[-1, 1]`.

use std::cmp::Ordering;

use log::{debug, warn};
use vismatch_core::{Error, Result};

use crate::types::{RankParams, ScoredId};

/// Hard ceiling on the number of results a single query may return.
pub const MAX_TOP_K: usize = 100;

/// Inner product of two equal-length vectors.
///
/// Products are accumulated in `f64` and rounded once at the end.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    sum as f32
}

/// Descending order on scores, with NaN sorted last.
fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Ranks catalog candidates against a query vector.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityRanker {
    dimension: usize,
    max_top_k: usize,
}

impl SimilarityRanker {
    /// Create a ranker for vectors of `dimension` elements.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_top_k: MAX_TOP_K,
        }
    }

    /// Override the result ceiling.
    pub fn with_max_top_k(mut self, max_top_k: usize) -> Self {
        self.max_top_k = max_top_k;
        self
    }

    /// The configured dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The result ceiling.
    pub fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    /// Score each candidate against the query, in candidate order.
    ///
    /// A candidate of the wrong length scores NaN, which [`rank`](Self::rank)
    /// would never return either.
    pub fn score(&self, query: &[f32], candidates: &[(&str, &[f32])]) -> Result<Vec<f32>> {
        self.check_query(query)?;
        Ok(candidates
            .iter()
            .map(|(id, vector)| {
                if self.fits(id, vector) {
                    inner_product(query, vector)
                } else {
                    f32::NAN
                }
            })
            .collect())
    }

    /// Rank candidates and return at most `top_k` ids scoring `>= min_score`.
    ///
    /// An empty candidate list yields an empty result, never an error.
    pub fn rank(
        &self,
        query: &[f32],
        candidates: &[(&str, &[f32])],
        params: RankParams,
    ) -> Result<Vec<ScoredId>> {
        self.check_query(query)?;
        let top_k = params.top_k.min(self.max_top_k);
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(candidates.len());
        let mut scores = Vec::with_capacity(candidates.len());
        for (id, vector) in candidates {
            if !self.fits(id, vector) {
                continue;
            }
            ids.push(*id);
            scores.push(inner_product(query, vector));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| descending(scores[a], scores[b]));

        let results: Vec<ScoredId> = order
            .into_iter()
            .filter(|&i| scores[i] >= params.min_score)
            .take(top_k)
            .map(|i| ScoredId {
                id: ids[i].to_string(),
                score: scores[i],
            })
            .collect();

        debug!(
            "Ranked {} candidates: {} accepted (top_k={top_k}, min_score={})",
            scores.len(),
            results.len(),
            params.min_score
        );
        Ok(results)
    }

    fn fits(&self, id: &str, vector: &[f32]) -> bool {
        if vector.len() == self.dimension {
            return true;
        }
        warn!(
            "Skipping candidate '{id}': {} elements, expected {}",
            vector.len(),
            self.dimension
        );
        false
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.dimension {
            return Err(Error::invalid_query(self.dimension, query.len()));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
