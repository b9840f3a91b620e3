//! Prometheus metrics for the validator.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

/// Validation outcomes counter.
pub static VALIDATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_validations_total",
        "Total number of validation requests",
        &["outcome"]
    )
    .expect("Failed to register validations metric")
});

/// Cache operations counter.
pub static CACHE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_cache_operations_total",
        "Total number of credential cache operations",
        &["operation"]
    )
    .expect("Failed to register cache_operations metric")
});

/// Stats flush cycles counter.
pub static STATS_FLUSHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_stats_flushes_total",
        "Total number of stats flush attempts",
        &["status"]
    )
    .expect("Failed to register stats_flushes metric")
});

/// Hits successfully flushed to storage.
pub static FLUSHED_HITS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "token_guard_flushed_hits_total",
        "Total hit count delivered to storage by flushes"
    )
    .expect("Failed to register flushed_hits metric")
});

/// Validation latency histogram.
pub static VALIDATION_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "token_guard_validation_latency_seconds",
        "Validation latency in seconds",
        &["outcome"],
        vec![0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05, 0.25, 1.0]
    )
    .expect("Failed to register validation_latency metric")
});

/// Record a validation outcome.
pub fn record_validation(outcome: &str) {
    VALIDATIONS.with_label_values(&[outcome]).inc();
}

/// Record a cache operation.
pub fn record_cache_operation(operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}

/// Record a stats flush attempt and, on success, its delivered hit count.
pub fn record_stats_flush(status: &str, hits: i64) {
    STATS_FLUSHES.with_label_values(&[status]).inc();
    if hits > 0 {
        #[allow(clippy::cast_precision_loss)]
        FLUSHED_HITS.inc_by(hits as f64);
    }
}

/// Record validation latency.
pub fn record_validation_latency(outcome: &str, seconds: f64) {
    VALIDATION_LATENCY
        .with_label_values(&[outcome])
        .observe(seconds);
}
