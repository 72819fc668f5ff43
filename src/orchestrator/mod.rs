//! Ranking orchestrator: concurrent retrieval fan-out, fusion, scoring,
//! blending, pagination.
//!
//! This module fans a query out to the lexical and semantic backends
//! concurrently, fuses the surviving candidate lists, enriches the
//! fused set with per-trial feasibility when a patient profile is
//! supplied, blends retrieval and feasibility into a final score, and
//! returns one page of the result.

pub mod blend;
pub mod rank;

pub use rank::Ranker;
