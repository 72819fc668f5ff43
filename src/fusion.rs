//! Fusing lexical and semantic candidate lists into a single ranking.
//!
//! Two strategies are offered. Reciprocal rank fusion ignores raw
//! backend scores entirely and sums `1 / (k + rank)` across the sources
//! a trial appears in, which makes it robust to incomparable score
//! scales. Linear fusion min-max normalizes each source's scores to
//! [0, 1] and takes a weighted sum, which preserves score magnitudes
//! when the backends are calibrated. Both finish with a min-max
//! normalization of the fused scores and a deterministic sort.

use std::collections::BTreeMap;

use crate::config::{FusionMode, RankingConfig};
use crate::types::{FusedCandidate, RetrievalCandidate, RetrievalSource};

/// Fuse the candidate lists from both backends according to `config`.
///
/// Input order within a source is irrelevant; only the 1-indexed `rank`
/// stamped on each candidate matters. A trial absent from both inputs
/// never appears in the output. Output is sorted by fused score
/// descending, ties broken by trial id ascending, and scores are
/// normalized to [0, 1] (all-equal inputs collapse to 1.0).
pub fn fuse(candidates: &[RetrievalCandidate], config: &RankingConfig) -> Vec<FusedCandidate> {
    let mut fused = match config.fusion {
        FusionMode::Rrf => rrf(candidates, config.clamped_rrf_k()),
        FusionMode::Linear => linear(candidates, config.clamped_lexical_weight()),
    };
    normalize_scores(&mut fused);
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.trial_id.cmp(&b.trial_id))
    });
    fused
}

/// Accumulator keyed by trial id; BTreeMap keeps iteration (and thus
/// pre-sort order) deterministic.
#[derive(Default)]
struct Accum {
    score: f64,
    lexical_rank: Option<usize>,
    semantic_rank: Option<usize>,
}

fn rrf(candidates: &[RetrievalCandidate], k: f64) -> Vec<FusedCandidate> {
    let mut by_trial: BTreeMap<&str, Accum> = BTreeMap::new();
    for candidate in candidates {
        let entry = by_trial.entry(&candidate.trial_id).or_default();
        entry.score += 1.0 / (k + candidate.rank as f64);
        record_rank(entry, candidate);
    }
    collect(by_trial)
}

fn linear(candidates: &[RetrievalCandidate], lexical_weight: f64) -> Vec<FusedCandidate> {
    let lexical_norm = per_source_norm(candidates, RetrievalSource::Lexical);
    let semantic_norm = per_source_norm(candidates, RetrievalSource::Semantic);

    let mut by_trial: BTreeMap<&str, Accum> = BTreeMap::new();
    for candidate in candidates {
        let (norm, weight) = match candidate.source {
            RetrievalSource::Lexical => (&lexical_norm, lexical_weight),
            RetrievalSource::Semantic => (&semantic_norm, 1.0 - lexical_weight),
        };
        let normalized = norm.get(candidate.trial_id.as_str()).copied().unwrap_or(0.0);
        let entry = by_trial.entry(&candidate.trial_id).or_default();
        entry.score += weight * normalized;
        record_rank(entry, candidate);
    }
    collect(by_trial)
}

fn record_rank(entry: &mut Accum, candidate: &RetrievalCandidate) {
    match candidate.source {
        RetrievalSource::Lexical => entry.lexical_rank = Some(candidate.rank),
        RetrievalSource::Semantic => entry.semantic_rank = Some(candidate.rank),
    }
}

fn collect(by_trial: BTreeMap<&str, Accum>) -> Vec<FusedCandidate> {
    by_trial
        .into_iter()
        .map(|(trial_id, accum)| FusedCandidate {
            trial_id: trial_id.to_string(),
            score: accum.score,
            lexical_rank: accum.lexical_rank,
            semantic_rank: accum.semantic_rank,
        })
        .collect()
}

/// Min-max normalize one source's raw scores to [0, 1]. A source whose
/// scores are all equal maps every candidate to 1.0.
fn per_source_norm<'a>(
    candidates: &'a [RetrievalCandidate],
    source: RetrievalSource,
) -> BTreeMap<&'a str, f64> {
    let scores: Vec<(&str, f64)> = candidates
        .iter()
        .filter(|c| c.source == source)
        .map(|c| (c.trial_id.as_str(), c.score))
        .collect();
    if scores.is_empty() {
        return BTreeMap::new();
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = scores
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    scores
        .into_iter()
        .map(|(id, s)| (id, if span > 0.0 { (s - min) / span } else { 1.0 }))
        .collect()
}

/// Min-max normalize fused scores in place. All-equal scores (including
/// a single candidate) collapse to 1.0 so downstream blending still has
/// a meaningful retrieval signal.
fn normalize_scores(fused: &mut [FusedCandidate]) {
    if fused.is_empty() {
        return;
    }
    let min = fused.iter().map(|c| c.score).fold(f64::INFINITY, f64::min);
    let max = fused
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    for candidate in fused {
        candidate.score = if span > 0.0 {
            (candidate.score - min) / span
        } else {
            1.0
        };
    }
}
