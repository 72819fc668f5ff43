//! The top-level ranking entry point.
//!
//! # Pipeline
//!
//! 1. Fan the query out to both retrieval backends concurrently, each
//!    bounded by the configured timeout
//! 2. Log per-backend failures at warn level; a single surviving source
//!    degrades gracefully, two dead sources are an error
//! 3. Fuse the candidate lists ([`crate::fusion`])
//! 4. When a patient profile is supplied, parse each candidate trial's
//!    eligibility criteria (through the read-through cache) and score
//!    feasibility ([`crate::scorer`])
//! 5. Blend, sort, paginate ([`super::blend`])

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backend::{RetrievalBackend, TrialStore};
use crate::cache::CriteriaCache;
use crate::config::RankingConfig;
use crate::error::RankError;
use crate::fusion;
use crate::parser::Lexicon;
use crate::scorer;
use crate::types::{
    BackendHit, FeasibilityResult, FusedCandidate, PatientProfile, RankResponse,
    RetrievalCandidate, RetrievalSource, SourceReport, SourceStatus,
};

use super::blend;

/// Hybrid retrieval and feasibility ranker over two injected backends
/// and a trial store.
pub struct Ranker<L, S, T> {
    lexical: L,
    semantic: S,
    cache: CriteriaCache<T>,
    lexicon: Arc<Lexicon>,
}

impl<L, S, T> Ranker<L, S, T>
where
    L: RetrievalBackend,
    S: RetrievalBackend,
    T: TrialStore,
{
    /// Build a ranker using the built-in clinical lexicon.
    pub fn new(lexical: L, semantic: S, store: T) -> Self {
        Self::with_lexicon(lexical, semantic, store, Lexicon::builtin())
    }

    /// Build a ranker with a caller-supplied lexicon.
    pub fn with_lexicon(lexical: L, semantic: S, store: T, lexicon: Arc<Lexicon>) -> Self {
        Self {
            lexical,
            semantic,
            cache: CriteriaCache::new(store),
            lexicon,
        }
    }

    /// Rank trials for `query`, optionally personalized to `patient`.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::Config`] for an invalid configuration and
    /// [`RankError::AllBackendsFailed`] only when **both** backends
    /// return errors. A timeout is not a failure: a backend that times
    /// out simply contributes no candidates, and two timed-out backends
    /// produce an empty, degraded response.
    pub async fn rank(
        &self,
        query: &str,
        patient: Option<&PatientProfile>,
        config: &RankingConfig,
    ) -> Result<RankResponse, RankError> {
        config.validate()?;

        let budget = Duration::from_millis(config.backend_timeout_ms);
        let pool = config.candidate_pool;
        let (lexical_outcome, semantic_outcome) = futures::future::join(
            timeout(budget, self.lexical.search(query, pool)),
            timeout(budget, self.semantic.search(query, pool)),
        )
        .await;

        let (lexical_hits, lexical_status) = settle(lexical_outcome, RetrievalSource::Lexical);
        let (semantic_hits, semantic_status) = settle(semantic_outcome, RetrievalSource::Semantic);

        if let (SourceStatus::Failed(lex), SourceStatus::Failed(sem)) =
            (&lexical_status, &semantic_status)
        {
            return Err(RankError::AllBackendsFailed(format!(
                "lexical: {lex}; semantic: {sem}"
            )));
        }

        let sources = SourceReport {
            lexical: lexical_status,
            semantic: semantic_status,
        };
        if sources.degraded() {
            warn!(?sources, "ranking with degraded retrieval");
        }

        let mut candidates =
            RetrievalCandidate::from_hits(lexical_hits, RetrievalSource::Lexical);
        candidates.extend(RetrievalCandidate::from_hits(
            semantic_hits,
            RetrievalSource::Semantic,
        ));
        if candidates.is_empty() {
            return Ok(RankResponse {
                hits: Vec::new(),
                total: 0,
                page_offset: config.page_offset,
                page_size: config.page_size,
                sources,
            });
        }

        let fused = fusion::fuse(&candidates, config);
        debug!(candidates = candidates.len(), fused = fused.len(), "fused candidate set");

        let patient = patient.map(|p| self.canonicalized(p));
        let enriched = self.enrich(fused, patient.as_ref()).await;

        let weight = patient.as_ref().map(|_| config.clamped_feasibility_weight());
        let blended = blend::blend(enriched, weight, config.drop_infeasible);
        let total = blended.len();
        let hits = blend::paginate(blended, config.page_offset, config.page_size);

        Ok(RankResponse {
            hits,
            total,
            page_offset: config.page_offset,
            page_size: config.page_size,
            sources,
        })
    }

    /// Attach a feasibility result to each fused candidate.
    ///
    /// A trial that cannot be fetched is kept rather than dropped; the
    /// store hiccup is logged and the candidate blends downstream with
    /// feasibility 0, so it stays visible without outranking scored
    /// feasible trials.
    async fn enrich(
        &self,
        fused: Vec<FusedCandidate>,
        patient: Option<&PatientProfile>,
    ) -> Vec<(FusedCandidate, Option<FeasibilityResult>)> {
        let Some(patient) = patient else {
            return fused.into_iter().map(|c| (c, None)).collect();
        };

        let mut enriched = Vec::with_capacity(fused.len());
        for candidate in fused {
            let feasibility = match self.cache.store().fetch_trial(&candidate.trial_id).await {
                Ok(Some(trial)) => {
                    let stored = self.cache.get_or_parse(&trial, &self.lexicon).await;
                    Some(scorer::score(patient, &stored.criteria))
                }
                Ok(None) => {
                    warn!(trial_id = %candidate.trial_id, "candidate trial missing from store");
                    None
                }
                Err(e) => {
                    warn!(trial_id = %candidate.trial_id, error = %e, "failed to fetch trial");
                    None
                }
            };
            enriched.push((candidate, feasibility));
        }
        enriched
    }

    /// Rewrite the patient's conditions to their canonical lexicon form
    /// so that "tnbc" in a profile matches "Breast Cancer" in criteria.
    fn canonicalized(&self, patient: &PatientProfile) -> PatientProfile {
        let mut canonical = patient.clone();
        canonical.conditions = patient
            .conditions
            .iter()
            .map(|c| {
                self.lexicon
                    .canonicalize(c)
                    .map(str::to_string)
                    .unwrap_or_else(|| c.clone())
            })
            .collect();
        canonical
    }
}

/// Collapse a timed-out backend call into its surviving hits and a
/// status for the provenance report.
fn settle(
    outcome: Result<Result<Vec<BackendHit>, RankError>, tokio::time::error::Elapsed>,
    source: RetrievalSource,
) -> (Vec<BackendHit>, SourceStatus) {
    match outcome {
        Ok(Ok(hits)) => {
            debug!(%source, count = hits.len(), "backend returned hits");
            let status = SourceStatus::Ok(hits.len());
            (hits, status)
        }
        Ok(Err(err)) => {
            warn!(%source, error = %err, "backend query failed");
            (Vec::new(), SourceStatus::Failed(err.to_string()))
        }
        Err(_) => {
            warn!(%source, "backend timed out");
            (Vec::new(), SourceStatus::TimedOut)
        }
    }
}
