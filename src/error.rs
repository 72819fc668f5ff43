//! Error types for the trial-rank crate.
//!
//! The pipeline degrades rather than fails wherever it can: a single
//! backend outage, a cache-write race, or unparseable eligibility text
//! are all absorbed and recorded as provenance. Only structurally
//! invalid configuration and the loss of every retrieval source are
//! surfaced to the caller.

/// Errors that can occur during a ranking request.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    /// Both retrieval backends returned errors. A single backend failure
    /// degrades to the surviving source instead.
    #[error("all retrieval backends failed: {0}")]
    AllBackendsFailed(String),

    /// The storage collaborator failed to read or write a record.
    #[error("storage error: {0}")]
    Storage(String),

    /// Structurally invalid configuration (e.g. zero page size). Weight
    /// parameters out of domain are clamped, not rejected.
    #[error("config error: {0}")]
    Config(String),

    /// The synonym lexicon could not be loaded or compiled.
    #[error("lexicon error: {0}")]
    Lexicon(String),
}

/// Convenience type alias for trial-rank results.
pub type Result<T> = std::result::Result<T, RankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_all_backends_failed() {
        let err = RankError::AllBackendsFailed("lexical: down; semantic: down".into());
        assert_eq!(
            err.to_string(),
            "all retrieval backends failed: lexical: down; semantic: down"
        );
    }

    #[test]
    fn display_storage() {
        let err = RankError::Storage("connection refused".into());
        assert_eq!(err.to_string(), "storage error: connection refused");
    }

    #[test]
    fn display_config() {
        let err = RankError::Config("page_size must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "config error: page_size must be greater than 0"
        );
    }

    #[test]
    fn display_lexicon() {
        let err = RankError::Lexicon("invalid JSON".into());
        assert_eq!(err.to_string(), "lexicon error: invalid JSON");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RankError>();
    }
}
