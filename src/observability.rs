//! In-process upload counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::operation::Classification;
use crate::worker::AggregateResult;

/// Metrics handle shared by workers and the control API
#[derive(Debug, Default)]
pub struct Metrics {
    uploads_succeeded: AtomicU64,
    uploads_failed: AtomicU64,
    uploads_retryable: AtomicU64,
    uploads_skipped: AtomicU64,
    batches_succeeded: AtomicU64,
    batches_failed: AtomicU64,
    batches_retry: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_finished(&self, classification: Classification) {
        let (counter, name) = match classification {
            Classification::Success => (&self.uploads_succeeded, "uploads_succeeded"),
            Classification::Fatal => (&self.uploads_failed, "uploads_failed"),
            Classification::Retryable => (&self.uploads_retryable, "uploads_retryable"),
            Classification::BenignSkip => (&self.uploads_skipped, "uploads_skipped"),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = name, "Metric incremented");
    }

    pub fn batch_finished(&self, result: AggregateResult) {
        let (counter, name) = match result {
            AggregateResult::Success => (&self.batches_succeeded, "batches_succeeded"),
            AggregateResult::Failure => (&self.batches_failed, "batches_failed"),
            AggregateResult::Retry => (&self.batches_retry, "batches_retry"),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = name, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_succeeded: self.uploads_succeeded.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            uploads_retryable: self.uploads_retryable.load(Ordering::Relaxed),
            uploads_skipped: self.uploads_skipped.load(Ordering::Relaxed),
            batches_succeeded: self.batches_succeeded.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            batches_retry: self.batches_retry.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub uploads_retryable: u64,
    pub uploads_skipped: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub batches_retry: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_per_bucket() {
        let metrics = Metrics::new();
        metrics.upload_finished(Classification::Success);
        metrics.upload_finished(Classification::Success);
        metrics.upload_finished(Classification::BenignSkip);
        metrics.batch_finished(AggregateResult::Retry);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uploads_succeeded, 2);
        assert_eq!(snapshot.uploads_skipped, 1);
        assert_eq!(snapshot.uploads_failed, 0);
        assert_eq!(snapshot.batches_retry, 1);
    }
}
