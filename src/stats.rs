//! Usage-statistics aggregation.
//!
//! Every successful validation records a hit; hits merge in memory per
//! credential and flush to storage in one batch per interval, so the hot
//! path never waits on a storage write. A failed flush keeps the drained
//! aggregates (merged back additively) and the next cycle retries with
//! accumulated totals.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::metrics;
use crate::shutdown::ShutdownSignal;
use crate::storage::{StatsUpdate, Storage};

struct HitCounter {
    hits: AtomicI64,
    last_access_us: AtomicI64,
}

impl HitCounter {
    fn new(now_us: i64) -> Self {
        Self {
            hits: AtomicI64::new(1),
            last_access_us: AtomicI64::new(now_us),
        }
    }

    fn record(&self, now_us: i64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.merge_last_access(now_us);
    }

    // CAS-max: later timestamps win, concurrent earlier ones lose quietly.
    fn merge_last_access(&self, candidate_us: i64) {
        let mut current = self.last_access_us.load(Ordering::Relaxed);
        while candidate_us > current {
            match self.last_access_us.compare_exchange_weak(
                current,
                candidate_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

/// In-memory per-credential hit aggregator.
///
/// `record_hit` takes the shared read lock and increments atomics, so
/// concurrent callers do not serialize against each other; the write lock
/// is only taken for the first hit on a credential in a window and by the
/// flush drain. Holding the read lock across the increment means a drain
/// cannot slice between lookup and increment, so no hit is ever lost.
#[derive(Default)]
pub struct StatsAggregator {
    counters: RwLock<HashMap<i64, Arc<HitCounter>>>,
}

impl StatsAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one validated request for `id`. Never blocks on I/O and
    /// never fails; called on every successful validation.
    pub fn record_hit(&self, id: i64) {
        let now_us = Utc::now().timestamp_micros();
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(&id) {
                counter.record(now_us);
                return;
            }
        }

        match self.counters.write().entry(id) {
            Entry::Occupied(entry) => entry.get().record(now_us),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(HitCounter::new(now_us)));
            }
        }
    }

    /// Number of credentials with unflushed hits.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.counters.read().len()
    }

    /// Merge all accumulated aggregates into storage as one batch, then
    /// clear them. On failure the aggregates are merged back so the next
    /// flush retries with accumulated totals.
    ///
    /// # Errors
    ///
    /// Propagates the [`StorageError`] from the batch write.
    pub async fn flush(&self, storage: &dyn Storage) -> Result<(), StorageError> {
        let drained = std::mem::take(&mut *self.counters.write());
        if drained.is_empty() {
            return Ok(());
        }

        let batch: Vec<StatsUpdate> = drained
            .iter()
            .map(|(id, counter)| StatsUpdate {
                id: *id,
                hits: counter.hits.load(Ordering::Relaxed),
                last_access: DateTime::from_timestamp_micros(
                    counter.last_access_us.load(Ordering::Relaxed),
                )
                .unwrap_or_default(),
            })
            .collect();
        let total_hits: i64 = batch.iter().map(|u| u.hits).sum();

        match storage.update_stats(&batch).await {
            Ok(()) => {
                metrics::record_stats_flush("success", total_hits);
                debug!(credentials = batch.len(), hits = total_hits, "stats flushed");
                Ok(())
            }
            Err(err) => {
                metrics::record_stats_flush("failure", 0);
                self.restore(drained);
                Err(err)
            }
        }
    }

    // Put drained counters back, merging with whatever accumulated while
    // the flush was in flight.
    fn restore(&self, drained: HashMap<i64, Arc<HitCounter>>) {
        let mut counters = self.counters.write();
        for (id, old) in drained {
            match counters.entry(id) {
                Entry::Vacant(entry) => {
                    entry.insert(old);
                }
                Entry::Occupied(entry) => {
                    let current = entry.get();
                    current
                        .hits
                        .fetch_add(old.hits.load(Ordering::Relaxed), Ordering::Relaxed);
                    current.merge_last_access(old.last_access_us.load(Ordering::Relaxed));
                }
            }
        }
    }
}

/// Periodic flush loop, decoupled from request handling. On shutdown it
/// attempts one final best-effort flush before exiting.
pub async fn run_flusher(
    stats: Arc<StatsAggregator>,
    storage: Arc<dyn Storage>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = stats.flush(storage.as_ref()).await {
                    warn!(error = %err, "stats flush failed, retaining aggregates");
                }
            }
            () = shutdown.recv() => {
                if let Err(err) = stats.flush(storage.as_ref()).await {
                    warn!(error = %err, "final stats flush failed, counters lost");
                } else {
                    info!("final stats flush complete");
                }
                return;
            }
        }
    }
}
