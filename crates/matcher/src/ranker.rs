//! Deduplication and ordering of toolkit match results.

use std::collections::HashMap;

use crate::types::{MatchResult, RankedAnswer, RankedHit, RankingMode, SearchStrategy};

/// Collapses [`MatchResult`] streams into a [`RankedAnswer`].
///
/// ```
/// use matcher::{MatchResult, RankingMode, ResultRanker, SearchStrategy};
///
/// let results = vec![
///     MatchResult::fingerprint("010", "TREE", 0.7),
///     MatchResult::fingerprint("010", "MACCS", 0.95),
///     MatchResult::fingerprint("020", "TREE", 0.99),
/// ];
/// let answer = ResultRanker::new(SearchStrategy::FingerprintSimilarity, RankingMode::ScoreAware)
///     .rank(&results);
/// assert_eq!(answer.ids(), vec!["020", "010"]);
/// assert_eq!(answer.scores(), vec![0.99, 0.95]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultRanker {
    strategy: SearchStrategy,
    mode: RankingMode,
}

impl ResultRanker {
    pub fn new(strategy: SearchStrategy, mode: RankingMode) -> Self {
        Self { strategy, mode }
    }

    pub fn rank(&self, results: &[MatchResult]) -> RankedAnswer {
        rank(results, self.strategy, self.mode)
    }
}

/// Score a single result under `strategy`, or `None` when it must be dropped.
fn result_score(result: &MatchResult, strategy: SearchStrategy) -> Option<f64> {
    if !strategy.is_fingerprint() {
        return Some(1.0);
    }
    match result.fp_score {
        Some(score) if score.is_finite() => Some(score),
        Some(score) => {
            tracing::warn!(cc_id = %result.cc_id, score, "dropping result with non-finite score");
            None
        }
        None => {
            tracing::warn!(cc_id = %result.cc_id, "dropping fingerprint result without score");
            None
        }
    }
}

/// Rank `results` gathered with `strategy`.
///
/// Identifiers are canonicalized at the first `|`. Fingerprint results keep
/// their best score; graph results score 1.0 and the first occurrence wins.
/// Results with an empty canonical identifier or a non-finite score are
/// logged and skipped.
pub fn rank(results: &[MatchResult], strategy: SearchStrategy, mode: RankingMode) -> RankedAnswer {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(results.len());
    let mut hits: Vec<RankedHit> = Vec::with_capacity(results.len());

    for result in results {
        let id = result.canonical_id();
        if id.is_empty() {
            tracing::warn!(cc_id = %result.cc_id, "dropping result with empty identifier");
            continue;
        }
        let Some(score) = result_score(result, strategy) else {
            continue;
        };

        match positions.get(id) {
            Some(&pos) => {
                if score > hits[pos].score {
                    hits[pos].score = score;
                }
            }
            None => {
                positions.insert(id, hits.len());
                hits.push(RankedHit {
                    id: id.to_string(),
                    score,
                });
            }
        }
    }

    if mode == RankingMode::ScoreAware {
        // sort_by is stable: equal scores keep encounter order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    tracing::debug!(
        strategy = %strategy,
        mode = mode.as_str(),
        input = results.len(),
        ranked = hits.len(),
        "ranked match results"
    );

    RankedAnswer {
        strategy,
        mode,
        hits,
    }
}
