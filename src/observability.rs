//! Expiration counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle shared by every evaluation of one process
#[derive(Debug, Default)]
pub struct Metrics {
    evaluations: AtomicU64,
    evaluation_errors: AtomicU64,
    snapshots_deleted: AtomicU64,
    snapshots_already_absent: AtomicU64,
    delete_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "evaluations", "Metric incremented");
    }

    pub fn evaluation_failed(&self) {
        self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "evaluation_errors", "Metric incremented");
    }

    pub fn snapshot_deleted(&self) {
        self.snapshots_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_already_absent(&self) {
        self.snapshots_already_absent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete_failed(&self) {
        self.delete_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "delete_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            evaluation_errors: self.evaluation_errors.load(Ordering::Relaxed),
            snapshots_deleted: self.snapshots_deleted.load(Ordering::Relaxed),
            snapshots_already_absent: self.snapshots_already_absent.load(Ordering::Relaxed),
            delete_failures: self.delete_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub evaluations: u64,
    pub evaluation_errors: u64,
    pub snapshots_deleted: u64,
    pub snapshots_already_absent: u64,
    pub delete_failures: u64,
}
