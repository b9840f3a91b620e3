//! Read-through credential cache.
//!
//! Shields storage from a read load proportional to proxied traffic: a
//! bounded LRU of credential snapshots, each considered stale after a
//! configured TTL. Misses and expired entries fetch from storage outside
//! the cache lock; concurrent misses for one identifier may race to fill
//! the same slot, which is harmless (idempotent fill, last-writer-wins).
//! Storage failures propagate as-is and never replace or poison existing
//! entries — the validator fails closed rather than serving a stale grant.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::credential::Credential;
use crate::error::StorageError;
use crate::metrics;
use crate::storage::Storage;
use crate::token::KeyId;

struct CacheEntry {
    record: Arc<Credential>,
    stored_at: Instant,
}

impl CacheEntry {
    fn fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() <= ttl
    }
}

/// Concurrent, capacity-bounded, TTL-based read-through cache mapping a
/// key's public identifier to its credential snapshot.
pub struct CredentialCache {
    storage: Arc<dyn Storage>,
    entries: Mutex<LruCache<KeyId, CacheEntry>>,
    ttl: Duration,
}

impl CredentialCache {
    /// Create a cache over `storage` holding at most `capacity` entries,
    /// each valid for `ttl` after it was filled. A zero capacity is
    /// clamped to one entry.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            storage,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Resolve a credential, reading through to storage when the cached
    /// entry is absent or stale.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] from the fill; the previous cache state
    /// is left untouched so a transient failure cannot materialize as a
    /// long-lived denial.
    pub async fn get(&self, id: KeyId) -> Result<Arc<Credential>, StorageError> {
        if let Some(entry) = self.entries.lock().get(&id) {
            if entry.fresh(self.ttl) {
                metrics::record_cache_operation("hit");
                return Ok(entry.record.clone());
            }
        }
        metrics::record_cache_operation("miss");

        // Optimistic fill: no per-key serialization, storage reads are
        // side-effect-free and bounded by the backend's own limits.
        let record = Arc::new(self.storage.find_by_key_id(id).await?);
        self.entries.lock().put(
            id,
            CacheEntry {
                record: record.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(record)
    }

    /// Drop the entry for `id`, forcing the next `get` to read through.
    /// Called whenever the underlying record changes or is deleted.
    pub fn invalidate(&self, id: KeyId) {
        metrics::record_cache_operation("invalidate");
        self.entries.lock().pop(&id);
    }

    /// Number of currently cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::NewCredential;
    use crate::storage::MemoryStorage;
    use crate::token::Key;

    fn seeded() -> (Arc<MemoryStorage>, Key) {
        let storage = Arc::new(MemoryStorage::new());
        let key = Key::generate().unwrap();
        storage
            .create(
                &key,
                NewCredential {
                    user: "admin".into(),
                    ..NewCredential::default()
                },
            )
            .unwrap();
        (storage, key)
    }

    #[tokio::test]
    async fn test_second_get_hits_cache() {
        let (storage, key) = seeded();
        let cache = CredentialCache::new(storage.clone(), 8, Duration::from_secs(60));

        cache.get(key.id()).await.unwrap();
        cache.get(key.id()).await.unwrap();
        assert_eq!(storage.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let (storage, key) = seeded();
        let cache = CredentialCache::new(storage.clone(), 8, Duration::ZERO);

        cache.get(key.id()).await.unwrap();
        cache.get(key.id()).await.unwrap();
        assert_eq!(storage.find_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (storage, key) = seeded();
        let cache = CredentialCache::new(storage.clone(), 8, Duration::from_secs(60));

        cache.get(key.id()).await.unwrap();
        cache.invalidate(key.id());
        cache.get(key.id()).await.unwrap();
        assert_eq!(storage.find_calls(), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction_at_capacity() {
        let storage = Arc::new(MemoryStorage::new());
        let mut keys = Vec::new();
        for _ in 0..3 {
            let key = Key::generate().unwrap();
            storage.create(&key, NewCredential::default()).unwrap();
            keys.push(key);
        }
        let cache = CredentialCache::new(storage.clone(), 2, Duration::from_secs(60));

        cache.get(keys[0].id()).await.unwrap();
        cache.get(keys[1].id()).await.unwrap();
        // Touch the first so the second becomes least-recently-used.
        cache.get(keys[0].id()).await.unwrap();
        cache.get(keys[2].id()).await.unwrap();
        assert_eq!(storage.find_calls(), 3);

        // Evicted entry reads through again; the survivor does not.
        cache.get(keys[1].id()).await.unwrap();
        assert_eq!(storage.find_calls(), 4);
        cache.get(keys[0].id()).await.unwrap();
        assert_eq!(storage.find_calls(), 4);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates_without_poisoning() {
        let (storage, key) = seeded();
        let cache = CredentialCache::new(storage.clone(), 8, Duration::from_secs(60));

        storage.set_fail_reads(true);
        assert!(cache.get(key.id()).await.is_err());
        assert!(cache.is_empty());

        storage.set_fail_reads(false);
        assert!(cache.get(key.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_does_not_clobber_stale_entry() {
        let (storage, key) = seeded();
        let cache = CredentialCache::new(storage.clone(), 8, Duration::ZERO);

        cache.get(key.id()).await.unwrap();
        storage.set_fail_reads(true);
        // Stale entry plus failing storage: the error propagates and the
        // old entry stays in place for observability, still stale.
        assert!(cache.get(key.id()).await.is_err());
        assert_eq!(cache.len(), 1);
    }
}
