//! Reciprocal Rank Fusion of the vector and keyword rankings.
//!
//! `score(id) = w_vec / (k + rank_vec) + w_kw / (k + rank_kw)` with 1-based ranks and a zero
//! term for a list the id is absent from.

use std::collections::HashMap;

use serde::Serialize;

use crate::memory::core::config::FusionConfig;
use crate::memory::core::ids::MemoryId;

/// A fused entry with its score breakdown.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FusedScore {
    /// Record id.
    pub id: MemoryId,
    /// Raw RRF score.
    pub score: f64,
    /// Score divided by the best attainable score, in `[0, 1]`.
    pub relevance: f64,
    /// 1-based rank in the vector list, if present.
    pub vector_rank: Option<usize>,
    /// 1-based rank in the keyword list, if present.
    pub keyword_rank: Option<usize>,
}

#[derive(Default)]
struct Ranks {
    vector: Option<usize>,
    keyword: Option<usize>,
}

/// Best score an id can reach: rank 1 in both lists.
#[must_use]
pub fn max_score(config: &FusionConfig) -> f64 {
    (config.vector_weight + config.keyword_weight) / (config.k_rrf + 1.0)
}

#[allow(clippy::cast_precision_loss)] // ranks are bounded by the index k
fn term(weight: f64, k_rrf: f64, rank: Option<usize>) -> f64 {
    rank.map_or(0.0, |rank| weight / (k_rrf + rank as f64))
}

/// Fuse two best-first id lists.
///
/// Output is ordered by descending score; ties go to the smaller id. A duplicate id within one
/// list keeps its best rank.
#[must_use]
pub fn fuse(
    vector_ids: &[MemoryId],
    keyword_ids: &[MemoryId],
    config: &FusionConfig,
) -> Vec<FusedScore> {
    let mut ranks: HashMap<MemoryId, Ranks> = HashMap::new();
    for (index, id) in vector_ids.iter().enumerate() {
        ranks.entry(*id).or_default().vector.get_or_insert(index + 1);
    }
    for (index, id) in keyword_ids.iter().enumerate() {
        ranks.entry(*id).or_default().keyword.get_or_insert(index + 1);
    }

    let best = max_score(config);
    let mut fused: Vec<FusedScore> = ranks
        .into_iter()
        .map(|(id, ranks)| {
            let score = term(config.vector_weight, config.k_rrf, ranks.vector)
                + term(config.keyword_weight, config.k_rrf, ranks.keyword);
            FusedScore {
                id,
                score,
                relevance: if best > 0.0 { (score / best).min(1.0) } else { 0.0 },
                vector_rank: ranks.vector,
                keyword_rank: ranks.keyword,
            }
        })
        .collect();

    fused.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    fused
}

/// Drop entries under `min_relevance`, then keep the first `limit`.
#[must_use]
pub fn select(mut fused: Vec<FusedScore>, min_relevance: f64, limit: usize) -> Vec<FusedScore> {
    fused.retain(|entry| entry.relevance >= min_relevance);
    fused.truncate(limit);
    fused
}
