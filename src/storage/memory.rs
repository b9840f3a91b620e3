//! In-memory storage for tests and local experiments.
//!
//! Mirrors the backend contract closely enough to exercise the cache and
//! stats paths: read-through misses can be counted, and both reads and
//! writes can be forced to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{StatsUpdate, Storage};
use crate::credential::{Credential, NewCredential};
use crate::error::{ProvisionError, StorageError};
use crate::token::{Key, KeyId};

/// HashMap-backed [`Storage`] implementation.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<KeyId, Credential>>,
    next_id: AtomicI64,
    find_calls: AtomicU64,
    update_calls: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a credential for the given key, validating its patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Pattern`] if the host or path glob is
    /// malformed.
    pub fn create(&self, key: &Key, params: NewCredential) -> Result<Credential, ProvisionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cred = Credential::new(id, key.id(), key.hash(), params, Utc::now())?;
        self.records.write().insert(cred.key_id, cred.clone());
        Ok(cred)
    }

    /// Remove a credential. Returns whether one existed.
    pub fn remove(&self, key_id: KeyId) -> bool {
        self.records.write().remove(&key_id).is_some()
    }

    /// Snapshot a record without going through the `Storage` trait.
    #[must_use]
    pub fn get(&self, key_id: KeyId) -> Option<Credential> {
        self.records.read().get(&key_id).cloned()
    }

    /// Number of `find_by_key_id` calls observed so far.
    #[must_use]
    pub fn find_calls(&self) -> u64 {
        self.find_calls.load(Ordering::Relaxed)
    }

    /// Number of `update_stats` calls observed so far.
    #[must_use]
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::Relaxed)
    }

    /// Force subsequent reads to fail with `Unavailable`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Force subsequent stats writes to fail with `Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_by_key_id(&self, id: KeyId) -> Result<Credential, StorageError> {
        self.find_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable("injected read failure".into()));
        }
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn update_stats(&self, batch: &[StatsUpdate]) -> Result<(), StorageError> {
        self.update_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        let mut records = self.records.write();
        for update in batch {
            if let Some(cred) = records.values_mut().find(|c| c.id == update.id) {
                cred.requests += update.hits;
                cred.last_access_at = match cred.last_access_at {
                    Some(current) => Some(current.max(update.last_access)),
                    None => Some(update.last_access),
                };
            }
        }
        Ok(())
    }
}
