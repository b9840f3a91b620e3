//! Storage collaborator contract.
//!
//! The validator core consumes durable storage only through this narrow
//! read/write surface; schema and migrations belong to the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::credential::Credential;
use crate::error::StorageError;
use crate::token::KeyId;

pub mod memory;
pub mod redis;

pub use memory::MemoryStorage;
pub use redis::RedisStorage;

/// Aggregated usage delta for one credential, produced by a stats flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsUpdate {
    /// Numeric credential identity.
    pub id: i64,
    /// Hits observed since the previous successful flush.
    pub hits: i64,
    /// Latest access time observed in the window.
    pub last_access: DateTime<Utc>,
}

/// Durable storage consumed by the validator core.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up a credential by its public identifier.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when no such credential exists,
    /// [`StorageError::Unavailable`] on transient backend failure.
    async fn find_by_key_id(&self, id: KeyId) -> Result<Credential, StorageError>;

    /// Apply a batch of usage deltas: hit counts are additive, the
    /// last-access timestamp merges with max semantics. The whole batch
    /// applies atomically; partial application on failure is not
    /// acceptable.
    ///
    /// # Errors
    ///
    /// [`StorageError::Unavailable`] if the batch could not be applied;
    /// the caller retains the aggregates and retries next cycle.
    async fn update_stats(&self, batch: &[StatsUpdate]) -> Result<(), StorageError>;
}
