//! In-memory cache of parsed eligibility criteria.
//!
//! Parsing is deterministic, so a parse is valid for as long as the
//! trial's eligibility text is unchanged. Records are tagged with a
//! hash of the source text; a hash mismatch (registry updated the
//! criteria) invalidates the record and triggers a re-parse. Uses
//! [`moka`] for async-friendly caching with automatic eviction.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, warn};

use crate::backend::TrialStore;
use crate::parser::{self, Lexicon};
use crate::types::{StoredCriteria, Trial};

/// Maximum number of cached parse records.
const MAX_CACHE_ENTRIES: u64 = 10_000;

/// Cached records expire after this long even if the text is unchanged.
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Hash of an eligibility text, used to detect stale parse records.
pub fn text_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Read-through cache in front of a [`TrialStore`]'s persisted parses.
///
/// Lookup order: record embedded on the [`Trial`], in-memory cache,
/// store, fresh parse. A fresh parse is written back to the store on a
/// best-effort basis; a failed write is logged and the parse is still
/// returned.
pub struct CriteriaCache<T> {
    store: T,
    parses: Cache<String, StoredCriteria>,
}

impl<T: TrialStore> CriteriaCache<T> {
    pub fn new(store: T) -> Self {
        Self {
            store,
            parses: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    /// Return the parsed criteria for `trial`, parsing on a miss.
    ///
    /// Every layer is validated against the hash of the trial's current
    /// eligibility text, so a stale record can never be served.
    pub async fn get_or_parse(&self, trial: &Trial, lexicon: &Lexicon) -> StoredCriteria {
        let hash = text_hash(&trial.eligibility_text);

        if let Some(stored) = &trial.parsed {
            if stored.source_hash == hash {
                return stored.clone();
            }
        }

        if let Some(stored) = self.parses.get(&trial.id).await {
            if stored.source_hash == hash {
                return stored;
            }
            debug!(trial_id = %trial.id, "cached parse is stale, re-parsing");
        }

        match self.store.fetch_parsed(&trial.id).await {
            Ok(Some(stored)) if stored.source_hash == hash => {
                self.parses.insert(trial.id.clone(), stored.clone()).await;
                return stored;
            }
            Ok(Some(_)) => {
                debug!(trial_id = %trial.id, "persisted parse is stale, re-parsing");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(trial_id = %trial.id, error = %e, "failed to fetch persisted parse");
            }
        }

        let stored = StoredCriteria {
            source_hash: hash,
            criteria: parser::parse(&trial.eligibility_text, lexicon),
        };
        if let Err(e) = self.store.store_parsed(&trial.id, stored.clone()).await {
            warn!(trial_id = %trial.id, error = %e, "failed to persist parsed criteria");
        }
        self.parses.insert(trial.id.clone(), stored.clone()).await;
        stored
    }
}
