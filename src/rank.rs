//! Ranking and near-tie detection
//!
//! Sorts scored candidates descending, truncates to a bounded top-K and
//! flags outcomes whose top two scores are too close for the caller to
//! auto-act on. Sorting is stable, so ties keep their catalog order and
//! identical inputs always produce identical outcomes.

use std::cmp::Ordering;

use crate::model::MatchResult;

/// Sort, truncate and flag near-ties.
///
/// `ambiguous` is true only when at least two results survive and the gap
/// between rank 1 and rank 2 is strictly below `disambiguation_gap`; a gap
/// of exactly the threshold is unambiguous.
pub fn rank(
    mut results: Vec<MatchResult>,
    top_k: usize,
    disambiguation_gap: f64,
) -> (Vec<MatchResult>, bool) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(top_k);

    let ambiguous =
        results.len() >= 2 && (results[0].score - results[1].score) < disambiguation_gap;

    (results, ambiguous)
}
