//! # trial-rank
//!
//! Hybrid retrieval and feasibility ranking for clinical trial search.
//!
//! This crate owns no index and no database. The lexical (keyword)
//! backend, the semantic (dense-vector) backend and the trial store are
//! injected behind traits; the crate contributes everything between a
//! query and a ranked page of trials.
//!
//! ## Design
//!
//! - Queries both retrieval backends concurrently and fuses their
//!   candidate lists (reciprocal rank fusion by default, weighted
//!   linear as an alternative)
//! - Parses free-text eligibility criteria into structured constraints
//!   using a configurable clinical lexicon, cached by text hash
//! - Scores patient feasibility per trial on a 0–100 point scale with
//!   explainable reason codes
//! - Blends retrieval relevance with feasibility into the final order
//! - Graceful degradation: if one backend fails or times out, the other
//!   still produces a ranking
//!
//! ## Determinism
//!
//! Given the same backends, trial texts and patient profile, a request
//! always produces the same ranking. Ties break by trial id, parsed
//! criteria serialize in a canonical order, and no stage consults a
//! clock or a random source.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fusion;
pub mod orchestrator;
pub mod parser;
pub mod scorer;
pub mod types;

pub use backend::{RetrievalBackend, TrialStore};
pub use config::{FusionMode, RankingConfig};
pub use error::{RankError, Result};
pub use orchestrator::Ranker;
pub use parser::Lexicon;
pub use types::{
    FeasibilityResult, PatientProfile, RankResponse, RankedResult, RetrievalSource, Trial,
};
