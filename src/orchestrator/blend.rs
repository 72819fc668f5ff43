//! Blending retrieval relevance with clinical feasibility.
//!
//! Retrieval scores are re-normalized over the window that actually
//! gets ranked before they are blended, so that dropping candidates
//! upstream cannot compress the retrieval signal into a corner of the
//! unit interval.

use crate::types::{FeasibilityResult, FusedCandidate, RankedResult};

/// Feasibility scores live on [0, 100]; blending happens on [0, 1].
const FEASIBILITY_SCALE: f64 = 100.0;

/// Blend fused candidates with their feasibility results into a final
/// ranking.
///
/// `feasibility_weight` is `None` when no patient profile was supplied;
/// candidates then rank on retrieval alone. With a weight `w` the final
/// score is `(1 - w) * retrieval + w * feasibility / 100`, and a
/// candidate missing its feasibility result (trial record unavailable)
/// blends with feasibility 0 so an unscorable trial can never outrank a
/// scored feasible one. With `drop_infeasible` set, candidates whose
/// feasibility verdict is negative are removed before the window is
/// normalized. Output is sorted by final score descending, ties broken
/// by trial id ascending.
pub fn blend(
    candidates: Vec<(FusedCandidate, Option<FeasibilityResult>)>,
    feasibility_weight: Option<f64>,
    drop_infeasible: bool,
) -> Vec<RankedResult> {
    let mut window: Vec<(FusedCandidate, Option<FeasibilityResult>)> = if drop_infeasible {
        candidates
            .into_iter()
            .filter(|(_, feas)| feas.as_ref().map_or(true, |f| f.feasible))
            .collect()
    } else {
        candidates
    };

    renormalize_retrieval(&mut window);

    let mut results: Vec<RankedResult> = window
        .into_iter()
        .map(|(candidate, feasibility)| {
            let retrieval_score = candidate.score;
            let score = match feasibility_weight {
                Some(w) => {
                    let feas_score = feasibility.as_ref().map_or(0.0, |f| f.score);
                    (1.0 - w) * retrieval_score + w * (feas_score / FEASIBILITY_SCALE)
                }
                None => retrieval_score,
            };
            RankedResult {
                trial_id: candidate.trial_id,
                score,
                retrieval_score,
                feasibility,
                lexical_rank: candidate.lexical_rank,
                semantic_rank: candidate.semantic_rank,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.trial_id.cmp(&b.trial_id))
    });
    results
}

/// Slice one page out of the full blended ranking.
///
/// An offset past the end yields an empty page, never an error.
pub fn paginate(results: Vec<RankedResult>, offset: usize, size: usize) -> Vec<RankedResult> {
    results.into_iter().skip(offset).take(size).collect()
}

/// Min-max re-normalize retrieval scores over the blending window.
/// All-equal windows (including a single candidate) collapse to 1.0.
fn renormalize_retrieval(window: &mut [(FusedCandidate, Option<FeasibilityResult>)]) {
    if window.is_empty() {
        return;
    }
    let min = window
        .iter()
        .map(|(c, _)| c.score)
        .fold(f64::INFINITY, f64::min);
    let max = window
        .iter()
        .map(|(c, _)| c.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    for (candidate, _) in window {
        candidate.score = if span > 0.0 {
            (candidate.score - min) / span
        } else {
            1.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fused(id: &str, score: f64) -> FusedCandidate {
        FusedCandidate {
            trial_id: id.to_string(),
            score,
            lexical_rank: Some(1),
            semantic_rank: None,
        }
    }

    fn feas(score: f64, feasible: bool) -> FeasibilityResult {
        FeasibilityResult {
            score,
            feasible,
            reasons: vec![],
        }
    }

    #[test]
    fn feasibility_can_overturn_retrieval_order() {
        // Retrieval strongly prefers A; feasibility strongly prefers B.
        let results = blend(
            vec![
                (fused("A", 0.9), Some(feas(10.0, true))),
                (fused("B", 0.3), Some(feas(80.0, true))),
            ],
            Some(0.6),
            false,
        );
        // Re-normalized retrieval: A = 1.0, B = 0.0.
        // A: 0.4 * 1.0 + 0.6 * 0.1 = 0.46; B: 0.4 * 0.0 + 0.6 * 0.8 = 0.48.
        assert_eq!(results[0].trial_id, "B");
        assert!((results[0].score - 0.48).abs() < 1e-9);
        assert!((results[1].score - 0.46).abs() < 1e-9);
    }

    #[test]
    fn weight_zero_keeps_retrieval_order() {
        let results = blend(
            vec![
                (fused("A", 0.9), Some(feas(0.0, true))),
                (fused("B", 0.3), Some(feas(100.0, true))),
            ],
            Some(0.0),
            false,
        );
        assert_eq!(results[0].trial_id, "A");
    }

    #[test]
    fn weight_one_ranks_purely_by_feasibility() {
        let results = blend(
            vec![
                (fused("A", 0.9), Some(feas(20.0, true))),
                (fused("B", 0.3), Some(feas(90.0, true))),
            ],
            Some(1.0),
            false,
        );
        assert_eq!(results[0].trial_id, "B");
        assert!((results[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn no_patient_ranks_on_retrieval_alone() {
        let results = blend(vec![(fused("A", 0.7), None)], None, false);
        // Single-candidate window normalizes to 1.0.
        assert!((results[0].score - 1.0).abs() < f64::EPSILON);
        assert!(results[0].feasibility.is_none());
    }

    #[test]
    fn unscorable_trial_blends_with_zero_feasibility() {
        // A trial missing from the store cannot outrank a perfectly
        // feasible one on retrieval alone.
        let results = blend(
            vec![
                (fused("GHOST", 1.0), None),
                (fused("LUNG", 0.9), Some(feas(100.0, true))),
            ],
            Some(0.6),
            false,
        );
        // Re-normalized retrieval: GHOST = 1.0, LUNG = 0.0.
        // GHOST: 0.4 * 1.0 + 0.6 * 0.0 = 0.4; LUNG: 0.6 * 1.0 = 0.6.
        assert_eq!(results[0].trial_id, "LUNG");
        assert!((results[0].score - 0.6).abs() < 1e-9);
        assert!((results[1].score - 0.4).abs() < 1e-9);
        assert!(results[1].feasibility.is_none());
    }

    #[test]
    fn drop_infeasible_filters_before_normalization() {
        let results = blend(
            vec![
                (fused("A", 0.9), Some(feas(50.0, true))),
                (fused("B", 0.5), Some(feas(0.0, false))),
                (fused("C", 0.1), Some(feas(50.0, true))),
            ],
            Some(0.0),
            true,
        );
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.trial_id != "B"));
        // Window is now {A: 0.9, C: 0.1}; C must normalize to exactly 0.
        let c = results.iter().find(|r| r.trial_id == "C").unwrap();
        assert!(c.retrieval_score.abs() < 1e-12);
    }

    #[test]
    fn infeasible_kept_by_default() {
        let results = blend(
            vec![(fused("A", 0.9), Some(feas(0.0, false)))],
            Some(0.6),
            false,
        );
        assert_eq!(results.len(), 1);
        assert!(!results[0].feasibility.as_ref().unwrap().feasible);
    }

    #[test]
    fn ties_break_by_trial_id() {
        let results = blend(
            vec![(fused("B", 0.5), None), (fused("A", 0.5), None)],
            None,
            false,
        );
        assert_eq!(results[0].trial_id, "A");
        assert_eq!(results[1].trial_id, "B");
    }

    #[test]
    fn paginate_slices_and_clamps() {
        let results: Vec<RankedResult> = blend(
            vec![
                (fused("A", 0.9), None),
                (fused("B", 0.5), None),
                (fused("C", 0.1), None),
            ],
            None,
            false,
        );
        let page = paginate(results.clone(), 1, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].trial_id, "B");

        let past_end = paginate(results, 10, 2);
        assert!(past_end.is_empty());
    }

    #[test]
    fn pagination_concatenation_equals_full_ranking() {
        let results: Vec<RankedResult> = blend(
            (0..7)
                .map(|i| (fused(&format!("T{i}"), i as f64), None))
                .collect(),
            None,
            false,
        );
        let mut pages: Vec<String> = Vec::new();
        for offset in (0..results.len()).step_by(3) {
            pages.extend(
                paginate(results.clone(), offset, 3)
                    .into_iter()
                    .map(|r| r.trial_id),
            );
        }
        let full: Vec<String> = results.into_iter().map(|r| r.trial_id).collect();
        assert_eq!(pages, full);
    }

    #[test]
    fn empty_window_blends_to_empty() {
        assert!(blend(vec![], None, false).is_empty());
    }
}
