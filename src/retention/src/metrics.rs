//! Retention Enforcement Metrics
//!
//! Thread-safe counters accumulated across sweeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::sweep::SweepReport;

/// Thread-safe metrics for tracking retention enforcement operations
#[derive(Debug, Clone)]
pub struct RetentionMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Number of completed sweeps
    sweeps: AtomicUsize,
    /// Shard groups deleted at the metadata layer
    shard_groups_deleted: AtomicUsize,
    /// Shard group deletions the metadata authority rejected
    shard_group_failures: AtomicUsize,
    /// Shards removed from local storage, orphans included
    shards_deleted: AtomicUsize,
    /// Local shard deletions that failed
    shard_failures: AtomicUsize,
    /// Orphan shards removed by reconciliation
    orphans_deleted: AtomicUsize,
    /// Failed prune requests
    prune_failures: AtomicUsize,
    /// Total sweep duration in milliseconds
    total_duration_ms: AtomicU64,
}

impl Default for RetentionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RetentionMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                sweeps: AtomicUsize::new(0),
                shard_groups_deleted: AtomicUsize::new(0),
                shard_group_failures: AtomicUsize::new(0),
                shards_deleted: AtomicUsize::new(0),
                shard_failures: AtomicUsize::new(0),
                orphans_deleted: AtomicUsize::new(0),
                prune_failures: AtomicUsize::new(0),
                total_duration_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Fold one sweep's outcome into the totals
    pub fn record_sweep(&self, report: &SweepReport) {
        let inner = &self.inner;
        inner.sweeps.fetch_add(1, Ordering::Relaxed);
        inner
            .shard_groups_deleted
            .fetch_add(report.shard_groups_deleted, Ordering::Relaxed);
        inner
            .shard_group_failures
            .fetch_add(report.shard_group_failures, Ordering::Relaxed);
        inner
            .shards_deleted
            .fetch_add(report.shards_deleted + report.orphans_deleted, Ordering::Relaxed);
        inner
            .shard_failures
            .fetch_add(report.shard_failures, Ordering::Relaxed);
        inner
            .orphans_deleted
            .fetch_add(report.orphans_deleted, Ordering::Relaxed);
        if !report.pruned {
            inner.prune_failures.fetch_add(1, Ordering::Relaxed);
        }
        inner
            .total_duration_ms
            .fetch_add(report.elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn sweeps(&self) -> usize {
        self.inner.sweeps.load(Ordering::Relaxed)
    }

    pub fn shard_groups_deleted(&self) -> usize {
        self.inner.shard_groups_deleted.load(Ordering::Relaxed)
    }

    pub fn shard_group_failures(&self) -> usize {
        self.inner.shard_group_failures.load(Ordering::Relaxed)
    }

    pub fn shards_deleted(&self) -> usize {
        self.inner.shards_deleted.load(Ordering::Relaxed)
    }

    pub fn shard_failures(&self) -> usize {
        self.inner.shard_failures.load(Ordering::Relaxed)
    }

    pub fn orphans_deleted(&self) -> usize {
        self.inner.orphans_deleted.load(Ordering::Relaxed)
    }

    pub fn prune_failures(&self) -> usize {
        self.inner.prune_failures.load(Ordering::Relaxed)
    }

    /// Get total duration in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        self.inner.total_duration_ms.load(Ordering::Relaxed)
    }
}
