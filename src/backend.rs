//! Trait definitions for the external collaborators.
//!
//! The pipeline owns no index and no database: the lexical backend, the
//! dense-vector backend and the relational store are injected behind
//! these traits. Both are queried from concurrent tasks, so every
//! implementation must be `Send + Sync`.

use crate::error::RankError;
use crate::types::{BackendHit, RetrievalSource, StoredCriteria, Trial};

/// A ranked-retrieval backend (lexical or semantic).
///
/// Implementations return candidates in their own rank order, best
/// first, with backend-native scores. Scores are not comparable across
/// backends; fusion treats them as ordinal.
pub trait RetrievalBackend: Send + Sync {
    /// Retrieve up to `limit` candidates for `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RankError`] if the backend is unreachable or rejects
    /// the query. The orchestrator absorbs single-source failures and
    /// degrades to the surviving list.
    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<BackendHit>, RankError>> + Send;

    /// Which retrieval source this backend represents.
    fn source(&self) -> RetrievalSource;
}

/// The relational store holding trials and their cached parsed criteria.
///
/// `store_parsed` must be an idempotent overwrite: concurrent parses of
/// the same trial may race, and last-writer-wins is acceptable because
/// parsing is deterministic.
pub trait TrialStore: Send + Sync {
    /// Fetch a trial record by id, or `None` if it does not exist.
    fn fetch_trial(
        &self,
        trial_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Trial>, RankError>> + Send;

    /// Fetch the persisted parsed-criteria record for a trial, if any.
    fn fetch_parsed(
        &self,
        trial_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<StoredCriteria>, RankError>> + Send;

    /// Persist a freshly parsed criteria record for a trial.
    fn store_parsed(
        &self,
        trial_id: &str,
        record: StoredCriteria,
    ) -> impl std::future::Future<Output = Result<(), RankError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParsedCriteria;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A mock backend for testing trait bounds and async execution.
    struct MockBackend {
        source: RetrievalSource,
        hits: Vec<BackendHit>,
        fail: bool,
    }

    impl RetrievalBackend for MockBackend {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<BackendHit>, RankError> {
            if self.fail {
                return Err(RankError::Storage("mock backend failure".into()));
            }
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        fn source(&self) -> RetrievalSource {
            self.source
        }
    }

    struct MockStore {
        parsed: Mutex<HashMap<String, StoredCriteria>>,
    }

    impl TrialStore for MockStore {
        async fn fetch_trial(&self, _trial_id: &str) -> Result<Option<Trial>, RankError> {
            Ok(None)
        }

        async fn fetch_parsed(&self, trial_id: &str) -> Result<Option<StoredCriteria>, RankError> {
            Ok(self.parsed.lock().expect("lock").get(trial_id).cloned())
        }

        async fn store_parsed(
            &self,
            trial_id: &str,
            record: StoredCriteria,
        ) -> Result<(), RankError> {
            self.parsed
                .lock()
                .expect("lock")
                .insert(trial_id.to_string(), record);
            Ok(())
        }
    }

    #[test]
    fn mock_backend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockBackend>();
        assert_send_sync::<MockStore>();
    }

    #[tokio::test]
    async fn mock_backend_returns_hits_up_to_limit() {
        let backend = MockBackend {
            source: RetrievalSource::Lexical,
            hits: vec![
                BackendHit {
                    trial_id: "NCT001".into(),
                    score: 9.0,
                },
                BackendHit {
                    trial_id: "NCT002".into(),
                    score: 7.0,
                },
            ],
            fail: false,
        };
        let hits = backend.search("lung cancer", 1).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].trial_id, "NCT001");
        assert_eq!(backend.source(), RetrievalSource::Lexical);
    }

    #[tokio::test]
    async fn mock_backend_propagates_errors() {
        let backend = MockBackend {
            source: RetrievalSource::Semantic,
            hits: vec![],
            fail: true,
        };
        let result = backend.search("melanoma", 10).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_store_round_trips_parsed_criteria() {
        let store = MockStore {
            parsed: Mutex::new(HashMap::new()),
        };
        assert!(store.fetch_parsed("NCT001").await.expect("fetch").is_none());

        let record = StoredCriteria {
            source_hash: 42,
            criteria: ParsedCriteria::default(),
        };
        store
            .store_parsed("NCT001", record.clone())
            .await
            .expect("store");
        let fetched = store.fetch_parsed("NCT001").await.expect("fetch");
        assert_eq!(fetched, Some(record));
    }
}
