//! Ranking configuration with sensible defaults.
//!
//! [`RankingConfig`] controls fusion mode, blending weights, candidate
//! pool size, pagination and backend timeouts. Weights outside their
//! domain are clamped at the boundary; only structurally invalid
//! pagination (a zero page size) or a zero pool/timeout is rejected.

use serde::{Deserialize, Serialize};

use crate::error::RankError;

/// How the lexical and semantic candidate lists are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionMode {
    /// Reciprocal Rank Fusion: `1 / (k + rank)` summed across sources.
    #[default]
    Rrf,
    /// Min-max normalize each source independently, then combine as
    /// `lexical_weight * lexical + (1 - lexical_weight) * semantic`.
    Linear,
}

/// Configuration for one ranking request.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Fusion algorithm for merging the two ranked candidate lists.
    pub fusion: FusionMode,
    /// RRF damping constant. Smaller values let top ranks dominate;
    /// larger values flatten the distribution. Clamped to >= 1.
    pub rrf_k: f64,
    /// Lexical share in [`FusionMode::Linear`], in [0, 1]. Clamped.
    pub lexical_weight: f64,
    /// Feasibility share of the final blended score, in [0, 1]. Clamped.
    pub feasibility_weight: f64,
    /// How many candidates to request from each backend. Needs to be
    /// large enough (hundreds to low thousands) that true positives
    /// outside the top of either individual list still surface.
    pub candidate_pool: usize,
    /// Page size applied after blending and sorting. Must be > 0.
    pub page_size: usize,
    /// Zero-based offset into the sorted candidate set.
    pub page_offset: usize,
    /// Independent timeout per retrieval backend, in milliseconds.
    pub backend_timeout_ms: u64,
    /// Drop hits whose feasibility verdict is explicitly false before
    /// pagination. Off by default: infeasible trials score 0 and sink.
    pub drop_infeasible: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            fusion: FusionMode::Rrf,
            rrf_k: 60.0,
            lexical_weight: 0.5,
            feasibility_weight: 0.6,
            candidate_pool: 500,
            page_size: 10,
            page_offset: 0,
            backend_timeout_ms: 2_000,
            drop_infeasible: false,
        }
    }
}

impl RankingConfig {
    /// Validates this configuration, returning an error if any field is
    /// structurally invalid.
    ///
    /// Checks:
    /// - `page_size` must be greater than 0
    /// - `candidate_pool` must be greater than 0
    /// - `backend_timeout_ms` must be greater than 0
    ///
    /// Weight fields are never rejected here; they are clamped at use.
    pub fn validate(&self) -> Result<(), RankError> {
        if self.page_size == 0 {
            return Err(RankError::Config("page_size must be greater than 0".into()));
        }
        if self.candidate_pool == 0 {
            return Err(RankError::Config(
                "candidate_pool must be greater than 0".into(),
            ));
        }
        if self.backend_timeout_ms == 0 {
            return Err(RankError::Config(
                "backend_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// RRF constant clamped to its usable domain.
    pub fn clamped_rrf_k(&self) -> f64 {
        if self.rrf_k.is_finite() && self.rrf_k >= 1.0 {
            self.rrf_k
        } else {
            1.0
        }
    }

    /// Lexical weight clamped to [0, 1].
    pub fn clamped_lexical_weight(&self) -> f64 {
        clamp_unit(self.lexical_weight)
    }

    /// Feasibility weight clamped to [0, 1].
    pub fn clamped_feasibility_weight(&self) -> f64 {
        clamp_unit(self.feasibility_weight)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
