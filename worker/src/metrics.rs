//! Worker metrics counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Runtime counters for the worker, shared across agent activities.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    llm_calls: AtomicU64,
    activities_completed: AtomicU64,
    activities_failed: AtomicU64,
    dlq_entries: AtomicU64,
    total_activity_duration_ms: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_call(&self) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_activity_completed(&self, duration: Duration) {
        self.activities_completed.fetch_add(1, Ordering::Relaxed);
        self.total_activity_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_activity_failed(&self) {
        self.activities_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dlq_entry(&self) {
        self.dlq_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn llm_calls(&self) -> u64 {
        self.llm_calls.load(Ordering::Relaxed)
    }

    pub fn activities_completed(&self) -> u64 {
        self.activities_completed.load(Ordering::Relaxed)
    }

    pub fn activities_failed(&self) -> u64 {
        self.activities_failed.load(Ordering::Relaxed)
    }

    pub fn dlq_entries(&self) -> u64 {
        self.dlq_entries.load(Ordering::Relaxed)
    }

    /// Average activity duration in milliseconds
    pub fn avg_activity_duration_ms(&self) -> f64 {
        let completed = self.activities_completed();
        if completed == 0 {
            return 0.0;
        }
        self.total_activity_duration_ms.load(Ordering::Relaxed) as f64 / completed as f64
    }
}
