//! Validation façade composing codec, cache, matcher, and stats.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::CredentialCache;
use crate::credential::Header;
use crate::error::ValidationError;
use crate::metrics;
use crate::stats::StatsAggregator;
use crate::storage::Storage;
use crate::token::{Key, KeyId};

/// Identity resolved by a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Owning user of the credential.
    pub user: String,
    /// Public identifier of the presented key, safe to expose as a hint.
    pub key_id: KeyId,
    /// Headers configured for injection downstream.
    pub headers: Vec<Header>,
}

/// The single operation the proxy calls on every request.
///
/// Explicitly constructed and wired; independent instances share nothing,
/// so tests can run validators side by side without cross-talk.
pub struct Validator {
    cache: CredentialCache,
    stats: Arc<StatsAggregator>,
}

impl Validator {
    /// Build a validator over `storage` with the given cache bounds.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        stats: Arc<StatsAggregator>,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache: CredentialCache::new(storage, cache_capacity, cache_ttl),
            stats,
        }
    }

    /// Validate a bearer token for a request to `host` + `path`.
    ///
    /// On success records a hit and returns the identity to inject. Every
    /// failure collapses to one uniform unauthorized outcome at the HTTP
    /// boundary; the distinct variants exist for logs and metrics only.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MalformedToken`], [`ValidationError::UnknownCredential`],
    /// [`ValidationError::AccessDenied`], or [`ValidationError::StorageUnavailable`].
    pub async fn validate(
        &self,
        host: &str,
        path: &str,
        token: &str,
    ) -> Result<Identity, ValidationError> {
        let key: Key = token.parse()?;

        let record = self.cache.get(key.id()).await?;

        if !record.verify(host, path, key.payload()) {
            return Err(ValidationError::AccessDenied);
        }

        self.stats.record_hit(record.id);
        debug!(key_id = %record.key_id, user = %record.user, "token validated");

        Ok(Identity {
            user: record.user.clone(),
            key_id: record.key_id,
            headers: record.headers.clone(),
        })
    }

    /// Validate and record outcome metrics with latency.
    ///
    /// Same contract as [`Self::validate`]; used by the HTTP boundary.
    ///
    /// # Errors
    ///
    /// See [`Self::validate`].
    pub async fn validate_instrumented(
        &self,
        host: &str,
        path: &str,
        token: &str,
    ) -> Result<Identity, ValidationError> {
        let started = std::time::Instant::now();
        let result = self.validate(host, path, token).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        metrics::record_validation(outcome);
        metrics::record_validation_latency(outcome, started.elapsed().as_secs_f64());
        result
    }

    /// Purge a cached credential after a mutation or deletion.
    pub fn invalidate(&self, id: KeyId) {
        self.cache.invalidate(id);
    }

    /// The shared stats aggregator (for wiring the flusher).
    #[must_use]
    pub fn stats(&self) -> Arc<StatsAggregator> {
        self.stats.clone()
    }
}
