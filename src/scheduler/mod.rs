//! Host-side scheduling around the upload worker
//!
//! Splits an account's queue into batches, invokes the job once per batch
//! and re-invokes `Retry` outcomes with capped exponential backoff. Retries
//! only carry the ids that are still pending, so finished uploads are never
//! sent twice.

mod backoff;

pub use backoff::Backoff;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::records::{self, UploadStatus, UploadStore};
use crate::worker::{AggregateResult, BatchInput, ScheduledJob};

/// Splits id lists into worker inputs
pub struct BatchPlanner;

impl BatchPlanner {
    /// Consecutive chunks of `ids`, each tagged with its position
    pub fn plan(account: &str, ids: &[u64], batch_size: usize) -> Vec<BatchInput> {
        let chunks: Vec<&[u64]> = ids.chunks(batch_size.max(1)).collect();
        let total = u32::try_from(chunks.len()).unwrap_or(u32::MAX);

        chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                BatchInput::new(account, chunk.to_vec())
                    .with_batch(u32::try_from(index).unwrap_or(u32::MAX), total)
            })
            .collect()
    }
}

/// Final state of one planned batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub batch_index: u32,
    pub attempts: u32,
    pub result: AggregateResult,
}

/// Accounts whose last run ended in `Failure`
///
/// A parked account is skipped until its pending queue differs from the one
/// it failed on, so a fatal condition is not hit again on every poll.
#[derive(Debug, Default)]
pub struct ParkedAccounts {
    parked: HashMap<String, Vec<u64>>,
}

impl ParkedAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_parked(&self, account: &str, pending: &[u64]) -> bool {
        self.parked
            .get(account)
            .is_some_and(|failed_on| failed_on.as_slice() == pending)
    }

    /// Park `account` after a failed run, or release it after a clean one
    pub fn record(&mut self, account: &str, outcomes: &[BatchOutcome], pending_after: Vec<u64>) {
        let failed = outcomes
            .iter()
            .any(|outcome| outcome.result == AggregateResult::Failure);
        if failed {
            self.parked.insert(account.to_string(), pending_after);
        } else {
            self.parked.remove(account);
        }
    }

    pub fn release(&mut self, account: &str) -> bool {
        self.parked.remove(account).is_some()
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}

pub struct UploadScheduler {
    job: Arc<dyn ScheduledJob>,
    store: Arc<dyn UploadStore>,
    backoff: Backoff,
    max_attempts: u32,
    batch_size: usize,
    shutdown: CancellationToken,
}

impl UploadScheduler {
    pub fn new(
        job: Arc<dyn ScheduledJob>,
        store: Arc<dyn UploadStore>,
        config: &SchedulerConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            job,
            store,
            backoff: Backoff::from_config(config),
            max_attempts: config.max_attempts.max(1),
            batch_size,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop waiting between retries once `token` fires
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Run every pending upload of `account`
    pub async fn run_pending(&self, account: &str) -> records::Result<Vec<BatchOutcome>> {
        let ids = self.store.pending_ids(account).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.run_all(account, &ids).await)
    }

    /// Run `ids` batch by batch. A `Failure` stops the remaining batches,
    /// since fatal results concern the whole account.
    pub async fn run_all(&self, account: &str, ids: &[u64]) -> Vec<BatchOutcome> {
        let batches = BatchPlanner::plan(account, ids, self.batch_size);
        info!(account, uploads = ids.len(), batches = batches.len(), "Scheduling uploads");

        let mut outcomes = Vec::with_capacity(batches.len());
        for batch in batches {
            if self.shutdown.is_cancelled() {
                break;
            }
            let outcome = self.run_batch(batch).await;
            let failed = outcome.result == AggregateResult::Failure;
            outcomes.push(outcome);
            if failed {
                warn!(account, "Batch failed, not scheduling the rest");
                break;
            }
        }
        outcomes
    }

    async fn run_batch(&self, mut batch: BatchInput) -> BatchOutcome {
        let batch_index = batch.current_batch_index;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = self.job.execute(&batch.to_input_data()).await;

            if result != AggregateResult::Retry || attempts >= self.max_attempts {
                return BatchOutcome {
                    batch_index,
                    attempts,
                    result,
                };
            }

            batch.upload_ids = self.remaining(&batch).await;
            if batch.upload_ids.is_empty() {
                return BatchOutcome {
                    batch_index,
                    attempts,
                    result: AggregateResult::Success,
                };
            }

            let delay = self.backoff.delay(attempts - 1);
            info!(
                account = %batch.account_name,
                batch_index,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                remaining = batch.upload_ids.len(),
                "Retrying upload batch"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    return BatchOutcome {
                        batch_index,
                        attempts,
                        result,
                    };
                }
            }
        }
    }

    /// Ids of `batch` still waiting to be uploaded
    async fn remaining(&self, batch: &BatchInput) -> Vec<u64> {
        match self
            .store
            .get_uploads_by_ids(&batch.upload_ids, &batch.account_name)
            .await
        {
            Ok(records) => records
                .into_iter()
                .filter(|record| record.status == UploadStatus::Pending)
                .map(|record| record.id)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not narrow retry batch, retrying all ids");
                batch.upload_ids.clone()
            }
        }
    }
}
