//! Cache Metrics
//!
//! Both caches report their counters through the [`CacheMetrics`] trait as a
//! `BTreeMap`, so keys always come out in the same order and reports from
//! two runs can be diffed directly.
//!
//! Counters that the façade bumps on the hot path are relaxed atomics. The
//! ones owned by the eviction policy (evictions, drains, weighted size) are
//! read under the eviction lock when a report is taken.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;

/// Trait every cache in this crate implements for metrics reporting.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs, keys sorted alphabetically.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Name identifying the cache implementation in reports.
    fn algorithm_name(&self) -> &'static str;
}

/// Lookup counters shared by every thread using a map.
#[derive(Debug, Default)]
pub(crate) struct AccessCounters {
    requests: AtomicU64,
    hits: AtomicU64,
    dropped_reads: AtomicU64,
}

impl AccessCounters {
    #[inline]
    pub(crate) fn record_hit(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A read task was discarded because its buffer was full.
    #[inline]
    pub(crate) fn record_dropped_read(&self) {
        self.dropped_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped_reads(&self) -> u64 {
        self.dropped_reads.load(Ordering::Relaxed)
    }

    /// Writes the lookup counters and the rates derived from them.
    pub(crate) fn report(&self, metrics: &mut BTreeMap<String, f64>) {
        let requests = self.requests.load(Ordering::Relaxed);
        // A hit recorded between the two loads must not push misses below zero.
        let hits = self.hits.load(Ordering::Relaxed).min(requests);
        let misses = requests - hits;

        metrics.insert("requests".to_string(), requests as f64);
        metrics.insert("cache_hits".to_string(), hits as f64);
        metrics.insert("cache_misses".to_string(), misses as f64);
        metrics.insert("dropped_reads".to_string(), self.dropped_reads() as f64);
        if requests > 0 {
            metrics.insert("hit_rate".to_string(), hits as f64 / requests as f64);
            metrics.insert("miss_rate".to_string(), misses as f64 / requests as f64);
        } else {
            metrics.insert("hit_rate".to_string(), 0.0);
            metrics.insert("miss_rate".to_string(), 0.0);
        }
    }
}
