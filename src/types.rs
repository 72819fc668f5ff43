//! Core types for the trial ranking data model.
//!
//! Absence of a field throughout [`ParsedCriteria`] and [`PatientProfile`]
//! means "no constraint" / "unknown", never "constraint = zero". Optional
//! semantics use `Option` rather than sentinel values, and collections use
//! ordered `BTree*` variants so that identical inputs always serialize to
//! byte-identical output.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A retrieval source feeding the fusion stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetrievalSource {
    /// Keyword-relevance backend (BM25-style token overlap ranking).
    Lexical,
    /// Dense-vector backend (embedding similarity).
    Semantic,
}

impl RetrievalSource {
    /// Returns the human-readable name of this source.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Gender constraint on a trial, or a patient's recorded gender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    /// No gender restriction. The default when a trial states none.
    #[default]
    All,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::All => "All",
        };
        f.write_str(label)
    }
}

/// Comparison operator attached to a lab threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    /// Evaluates `value <op> threshold`.
    pub fn satisfied(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
        }
    }

    /// True for `<` / `<=`, i.e. the threshold is an upper bound.
    /// An upper bound is stricter at smaller values, a lower bound at larger.
    pub fn is_upper_bound(&self) -> bool {
        matches!(self, Self::Lt | Self::Le)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A numeric eligibility threshold on a named lab value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabThreshold {
    pub op: Comparator,
    pub value: f64,
}

impl LabThreshold {
    /// Whether `measured` satisfies this threshold.
    pub fn satisfied(&self, measured: f64) -> bool {
        self.op.satisfied(measured, self.value)
    }

    /// Returns the stricter of two thresholds sharing the same bound
    /// direction. Mixed directions keep `self` (first extraction wins).
    pub fn most_restrictive(self, other: LabThreshold) -> LabThreshold {
        if self.op.is_upper_bound() != other.op.is_upper_bound() {
            return self;
        }
        let other_stricter = if self.op.is_upper_bound() {
            other.value < self.value
        } else {
            other.value > self.value
        };
        if other_stricter {
            other
        } else {
            self
        }
    }
}

/// Allowed ECOG performance-status range (0–5 scale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcogRange {
    pub min: u8,
    pub max: u8,
}

impl EcogRange {
    pub fn contains(&self, value: u8) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Allowed prior lines-of-therapy range. Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl LinesRange {
    pub fn contains(&self, lines: u32) -> bool {
        self.min.map_or(true, |m| lines >= m) && self.max.map_or(true, |m| lines <= m)
    }

    /// True when neither bound is set.
    pub fn is_unconstrained(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Fixed vocabulary of disqualifying conditions matched in exclusion text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExclusionFlag {
    Pregnancy,
    Hiv,
    HepatitisB,
    HepatitisC,
    CnsMetastases,
    PriorMalignancy,
    AutoimmuneDisease,
    ActiveInfection,
}

impl ExclusionFlag {
    /// Stable label used in reason codes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pregnancy => "pregnancy",
            Self::Hiv => "hiv",
            Self::HepatitisB => "hepatitis_b",
            Self::HepatitisC => "hepatitis_c",
            Self::CnsMetastases => "cns_metastases",
            Self::PriorMalignancy => "prior_malignancy",
            Self::AutoimmuneDisease => "autoimmune_disease",
            Self::ActiveInfection => "active_infection",
        }
    }

    /// All vocabulary entries, in scan order.
    pub fn all() -> &'static [ExclusionFlag] {
        &[
            Self::Pregnancy,
            Self::Hiv,
            Self::HepatitisB,
            Self::HepatitisC,
            Self::CnsMetastases,
            Self::PriorMalignancy,
            Self::AutoimmuneDisease,
            Self::ActiveInfection,
        ]
    }
}

impl fmt::Display for ExclusionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured extraction from a trial's free-text eligibility criteria.
///
/// Produced once per trial text version by the parser and cached; every
/// field defaults to "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCriteria {
    /// Canonical condition terms found in the inclusion segment.
    pub inclusion_conditions: BTreeSet<String>,
    /// Canonical biomarker terms required by the trial.
    pub required_biomarkers: BTreeSet<String>,
    /// Numeric thresholds keyed by canonical lab name. Repeated mentions
    /// of a lab keep the most restrictive threshold.
    pub lab_thresholds: BTreeMap<String, LabThreshold>,
    /// Subset of `lab_thresholds` whose failure disqualifies the patient
    /// outright (organ-function labs required for dosing safety). The
    /// rest contribute points only.
    pub gating_labs: BTreeSet<String>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub gender: Gender,
    /// Disqualifying conditions found in the exclusion segment.
    pub hard_exclusions: BTreeSet<ExclusionFlag>,
    /// Minimum days since last treatment, normalized from days/weeks phrasing.
    pub washout_days: Option<u32>,
    pub therapy_lines: LinesRange,
    pub ecog: Option<EcogRange>,
}

/// Parsed criteria as persisted by the storage collaborator, tagged with
/// the hash of the eligibility text it was derived from. A hash mismatch
/// against the current text invalidates the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCriteria {
    pub source_hash: u64,
    pub criteria: ParsedCriteria,
}

/// A clinical trial record, immutable per version. Owned by storage; the
/// pipeline only reads it and may write back freshly parsed criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub id: String,
    pub title: String,
    /// Conditions the trial studies, in registry order.
    pub conditions: Vec<String>,
    pub interventions: Vec<String>,
    /// Raw eligibility criteria text (inclusion + exclusion prose).
    pub eligibility_text: String,
    /// Cached parse of `eligibility_text`, if one has been persisted.
    pub parsed: Option<StoredCriteria>,
}

/// A patient profile supplied by the caller. Every field is optional;
/// absent fields contribute nothing to feasibility rather than failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientProfile {
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub ecog: Option<u8>,
    pub conditions: BTreeSet<String>,
    pub biomarkers: BTreeSet<String>,
    /// Current lab values keyed by canonical lab name.
    pub labs: BTreeMap<String, f64>,
    pub prior_lines: Option<u32>,
    pub days_since_last_treatment: Option<u32>,
    /// History flags checked against trial hard exclusions.
    pub history: BTreeSet<ExclusionFlag>,
}

/// A raw hit returned by a retrieval backend, in backend rank order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendHit {
    pub trial_id: String,
    /// Backend-native relevance score. Not comparable across backends;
    /// treated as ordinal by the fusion stage.
    pub score: f64,
}

/// A backend hit annotated with its source and 1-indexed rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub trial_id: String,
    pub score: f64,
    pub source: RetrievalSource,
    pub rank: usize,
}

impl RetrievalCandidate {
    /// Annotate an ordered backend hit list with ranks for `source`.
    pub fn from_hits(hits: Vec<BackendHit>, source: RetrievalSource) -> Vec<RetrievalCandidate> {
        hits.into_iter()
            .enumerate()
            .map(|(i, hit)| RetrievalCandidate {
                trial_id: hit.trial_id,
                score: hit.score,
                source,
                rank: i + 1,
            })
            .collect()
    }
}

/// A candidate after fusion: normalized score plus provenance ranks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub trial_id: String,
    /// Fused score, min-max normalized to [0, 1] across the candidate set.
    pub score: f64,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

/// Outcome of scoring one patient against one trial's parsed criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    /// Clinical eligibility score in [0, 100].
    pub score: f64,
    /// False only on a hard exclusion or a failed gating lab.
    pub feasible: bool,
    /// Reason codes in evaluation order, for explainability.
    pub reasons: Vec<String>,
}

/// The externally visible ranking unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub trial_id: String,
    /// Final blended score in [0, 1].
    pub score: f64,
    /// Retrieval score re-normalized over the final ranking window.
    pub retrieval_score: f64,
    /// Absent when no patient profile was supplied or the trial had no
    /// eligibility text to score against.
    pub feasibility: Option<FeasibilityResult>,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

/// Per-source outcome of the retrieval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    /// The backend returned this many hits within its timeout.
    Ok(usize),
    /// The backend did not answer within its timeout window.
    TimedOut,
    /// The backend returned an error.
    Failed(String),
}

impl SourceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Retrieval provenance for one ranking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub lexical: SourceStatus,
    pub semantic: SourceStatus,
}

impl SourceReport {
    /// True when at least one source did not contribute results.
    pub fn degraded(&self) -> bool {
        !self.lexical.is_ok() || !self.semantic.is_ok()
    }
}

/// A page of ranked results plus provenance diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankResponse {
    /// The requested page, ordered by final score descending.
    pub hits: Vec<RankedResult>,
    /// Size of the full blended candidate set the page was sliced from.
    pub total: usize,
    pub page_offset: usize,
    pub page_size: usize,
    pub sources: SourceReport,
}
