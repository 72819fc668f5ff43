//! Deterministic feasibility scoring of a patient against parsed criteria.
//!
//! Pure and I/O-free: safe to call from any worker thread and cheap
//! enough that results are recomputed per request rather than cached.
//! Two rules short-circuit to a zero, infeasible result: a patient
//! history flag matching a trial hard exclusion, and a failed threshold
//! on a gating (organ-function) lab. Every other mismatch merely earns
//! no points. Absent fields on either side are "unknown" and contribute
//! nothing.

use std::collections::BTreeSet;

use crate::types::{FeasibilityResult, ParsedCriteria, PatientProfile};

/// Component weights. Lab passes are worth [`LAB_POINTS`] each, capped
/// at [`LAB_POINTS_CAP`] across all labs.
const CONDITION_POINTS: u32 = 40;
const BIOMARKER_POINTS: u32 = 25;
const ECOG_POINTS: u32 = 15;
const LINES_POINTS: u32 = 10;
const AGE_POINTS: u32 = 5;
const GENDER_POINTS: u32 = 5;
const WASHOUT_POINTS: u32 = 5;
const LAB_POINTS: u32 = 5;
const LAB_POINTS_CAP: u32 = 15;

const MAX_SCORE: u32 = 100;

/// Score a patient against one trial's parsed eligibility criteria.
///
/// Returns a score in [0, 100], a feasibility verdict, and reason codes
/// in evaluation order. Safe to call with a fully empty
/// [`PatientProfile`].
pub fn score(patient: &PatientProfile, parsed: &ParsedCriteria) -> FeasibilityResult {
    // Rule 1: hard exclusions end the evaluation immediately.
    if let Some(flag) = patient
        .history
        .iter()
        .find(|flag| parsed.hard_exclusions.contains(flag))
    {
        return FeasibilityResult {
            score: 0.0,
            feasible: false,
            reasons: vec![format!("hard_exclusion:{flag}")],
        };
    }

    let mut points: u32 = 0;
    let mut reasons: Vec<String> = Vec::new();

    // Condition match.
    if !patient.conditions.is_empty() && !parsed.inclusion_conditions.is_empty() {
        match condition_overlap(&patient.conditions, &parsed.inclusion_conditions) {
            Some(matched) => {
                points += CONDITION_POINTS;
                reasons.push(format!("condition_match:{matched}"));
            }
            None => reasons.push("condition_mismatch".into()),
        }
    }

    // Biomarker match, or no biomarker requirement at all.
    if parsed.required_biomarkers.is_empty() {
        points += BIOMARKER_POINTS;
        reasons.push("no_biomarker_requirement".into());
    } else if !patient.biomarkers.is_empty() {
        match patient
            .biomarkers
            .iter()
            .find(|b| contains_ci(&parsed.required_biomarkers, b))
        {
            Some(matched) => {
                points += BIOMARKER_POINTS;
                reasons.push(format!("biomarker_match:{matched}"));
            }
            None => reasons.push("biomarker_mismatch".into()),
        }
    }

    // ECOG performance status.
    if let (Some(range), Some(ecog)) = (parsed.ecog, patient.ecog) {
        if range.contains(ecog) {
            points += ECOG_POINTS;
            reasons.push(format!("ecog_ok:{ecog}"));
        } else {
            reasons.push(format!("ecog_mismatch:{ecog}"));
        }
    }

    // Prior lines of therapy.
    if !parsed.therapy_lines.is_unconstrained() {
        if let Some(lines) = patient.prior_lines {
            if parsed.therapy_lines.contains(lines) {
                points += LINES_POINTS;
                reasons.push(format!("lines_ok:{lines}"));
            } else {
                reasons.push(format!("lines_mismatch:{lines}"));
            }
        }
    }

    // Age bounds.
    if parsed.age_min.is_some() || parsed.age_max.is_some() {
        if let Some(age) = patient.age {
            let above_min = parsed.age_min.map_or(true, |m| age >= m);
            let below_max = parsed.age_max.map_or(true, |m| age <= m);
            if above_min && below_max {
                points += AGE_POINTS;
                reasons.push(format!("age_ok:{age}"));
            } else {
                reasons.push(format!("age_mismatch:{age}"));
            }
        }
    }

    // Gender constraint.
    if let Some(gender) = patient.gender {
        if parsed.gender == crate::types::Gender::All || parsed.gender == gender {
            points += GENDER_POINTS;
            reasons.push("gender_ok".into());
        } else {
            reasons.push("gender_mismatch".into());
        }
    }

    // Washout period.
    if let (Some(required), Some(elapsed)) = (parsed.washout_days, patient.days_since_last_treatment)
    {
        if elapsed >= required {
            points += WASHOUT_POINTS;
            reasons.push("washout_ok".into());
        } else {
            reasons.push(format!("washout_mismatch:{elapsed}<{required}"));
        }
    }

    // Rule 2: lab thresholds. A failed gating lab forces the result to
    // zero regardless of points earned elsewhere; additive labs only
    // contribute points, capped across the board.
    let mut lab_points: u32 = 0;
    let mut gating_failed = false;
    for (lab, threshold) in &parsed.lab_thresholds {
        let Some(&measured) = patient.labs.get(lab) else {
            continue;
        };
        if threshold.satisfied(measured) {
            lab_points += LAB_POINTS;
            reasons.push(format!("lab_pass:{lab}"));
        } else if parsed.gating_labs.contains(lab) {
            gating_failed = true;
            reasons.push(format!("gating_lab_fail:{lab}"));
        } else {
            reasons.push(format!("lab_fail:{lab}"));
        }
    }
    points += lab_points.min(LAB_POINTS_CAP);

    if gating_failed {
        return FeasibilityResult {
            score: 0.0,
            feasible: false,
            reasons,
        };
    }

    FeasibilityResult {
        score: f64::from(points.min(MAX_SCORE)),
        feasible: true,
        reasons,
    }
}

/// Fuzzy, case-insensitive condition overlap: a patient condition and a
/// trial condition match when either contains the other as a substring
/// ("lung cancer" matches "non-small cell lung cancer" canonicalized
/// forms either way).
fn condition_overlap(patient: &BTreeSet<String>, trial: &BTreeSet<String>) -> Option<String> {
    for p in patient {
        let p_lower = p.to_lowercase();
        for t in trial {
            let t_lower = t.to_lowercase();
            if t_lower.contains(&p_lower) || p_lower.contains(&t_lower) {
                return Some(t.clone());
            }
        }
    }
    None
}

fn contains_ci(set: &BTreeSet<String>, needle: &str) -> bool {
    set.iter().any(|s| s.eq_ignore_ascii_case(needle))
}
