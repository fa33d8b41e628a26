//! Batch runner - processes one `BatchInput` end to end

use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{AggregateResult, BatchInput, InputData, ScheduledJob};
use crate::accounts::{AccountLookup, AccountResolver, User};
use crate::connectivity::ConnectivityOracle;
use crate::events::{BatchEvent, BroadcastEmitter, EventEmitter};
use crate::humanize::ByteSize;
use crate::notifications::{self, BatchCounts, NotificationReporter, TracingReporter};
use crate::observability::Metrics;
use crate::operation::{Classification, OperationContext, OperationFactory, ResultCode, classify};
use crate::preferences::Preferences;
use crate::records::{UploadRecord, UploadStatus, UploadStore};
use crate::registry::ActiveOperationRegistry;
use crate::storage::StorageClient;

/// Orchestrates one batch over injected collaborators
///
/// Built with [`UploadWorker::builder`]. The registry is shared: hand the
/// same `Arc` to every worker in the process so cancellation reaches any
/// in-flight upload.
#[derive(bon::Builder)]
pub struct UploadWorker {
    accounts: Arc<dyn AccountResolver>,
    store: Arc<dyn UploadStore>,
    preferences: Arc<dyn Preferences>,
    factory: Arc<dyn OperationFactory>,
    connectivity: Arc<dyn ConnectivityOracle>,
    storage: StorageClient,
    #[builder(default = Arc::new(ActiveOperationRegistry::new()))]
    registry: Arc<ActiveOperationRegistry>,
    #[builder(default = default_reporter())]
    reporter: Arc<dyn NotificationReporter>,
    #[builder(default = default_events())]
    events: Arc<dyn EventEmitter>,
    #[builder(default = Arc::new(Metrics::new()))]
    metrics: Arc<Metrics>,
    #[builder(default = ByteSize::mib(4))]
    chunk_size: ByteSize,
    #[builder(default = ByteSize::kib(512))]
    metered_chunk_size: ByteSize,
    /// Once cancelled, no further record is started
    #[builder(default)]
    shutdown: CancellationToken,
}

fn default_reporter() -> Arc<dyn NotificationReporter> {
    Arc::new(TracingReporter)
}

fn default_events() -> Arc<dyn EventEmitter> {
    Arc::new(BroadcastEmitter::new())
}

impl UploadWorker {
    pub fn registry(&self) -> &Arc<ActiveOperationRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Process one batch and return its terminal state
    pub async fn run(&self, input: BatchInput) -> AggregateResult {
        let span = info_span!(
            "upload_batch",
            run_id = %Uuid::now_v7(),
            account = %input.account_name,
            batch_index = input.current_batch_index,
        );
        self.run_batch(input).instrument(span).await
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Stop starting records and cancel whatever is still in flight
    ///
    /// Interrupted uploads stay queued and the batch reports `Retry`.
    pub fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        let cancelled = self.registry.cancel_all();
        info!(cancelled, "Upload worker shut down");
        cancelled
    }

    async fn run_batch(&self, input: BatchInput) -> AggregateResult {
        // Nothing may be touched before the input is known to be good
        if let Err(e) = input.validate() {
            warn!(error = %e, "Rejecting upload batch");
            return AggregateResult::Failure;
        }

        let user = match self.accounts.resolve(&input.account_name).await {
            AccountLookup::Found(user) => user,
            AccountLookup::NotFound => {
                warn!("Account not found, failing batch");
                return self.finish_early(AggregateResult::Failure);
            }
        };

        let records = match self
            .store
            .get_uploads_by_ids(&input.upload_ids, &input.account_name)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to load upload records");
                return self.finish_early(AggregateResult::Retry);
            }
        };

        if records.is_empty() {
            info!(requested = input.upload_ids.len(), "No queued uploads in batch");
            return self.finish_early(AggregateResult::Success);
        }

        if self.preferences.is_global_upload_paused() {
            info!(queued = records.len(), "Uploads are paused, skipping batch");
            return self.finish_early(AggregateResult::Success);
        }

        self.emit(BatchEvent::BatchStarted {
            account: input.account_name.clone(),
            batch_index: input.current_batch_index,
            total_batches: input.total_batches,
            queued: records.len(),
        });

        let client = self.storage.for_user(&user);
        let context = OperationContext {
            connectivity: self.connectivity.clone(),
            chunk_size: self.chunk_size,
            metered_chunk_size: self.metered_chunk_size,
            batch_index: input.current_batch_index,
            total_batches: input.total_batches,
        };

        let mut counts = BatchCounts::new(records.len());
        let mut fatal = false;
        let mut retry = false;

        for record in &records {
            if self.shutdown.is_cancelled() {
                info!(
                    remaining = records.len() - counts.processed(),
                    "Shutting down, leaving the rest of the batch queued"
                );
                retry = true;
                break;
            }

            let classification = self.process_record(record, &user, &client, &context).await;
            counts.record(classification);

            match classification {
                Classification::Fatal => {
                    warn!(
                        upload_id = record.id,
                        remaining = records.len() - counts.processed(),
                        "Fatal upload result, stopping batch"
                    );
                    fatal = true;
                    break;
                }
                Classification::Retryable => retry = true,
                Classification::Success | Classification::BenignSkip => {}
            }
        }
        counts.finish();

        let result = if fatal {
            AggregateResult::Failure
        } else if retry {
            AggregateResult::Retry
        } else {
            AggregateResult::Success
        };

        self.notify(None, |reporter| {
            reporter.report_batch_summary(&input.account_name, &counts)
        });
        self.emit(BatchEvent::BatchFinished {
            account: input.account_name.clone(),
            result,
            counts,
        });
        self.metrics.batch_finished(result);

        info!(
            %result,
            succeeded = counts.succeeded,
            failed = counts.failed,
            retryable = counts.retryable,
            skipped = counts.skipped,
            "Upload batch completed"
        );
        result
    }

    async fn process_record(
        &self,
        record: &UploadRecord,
        user: &User,
        client: &StorageClient,
        context: &OperationContext,
    ) -> Classification {
        self.set_status(record.id, UploadStatus::InProgress, None).await;
        self.notify(Some(record.id), |reporter| reporter.report_start(record));

        let created = panic::catch_unwind(AssertUnwindSafe(|| {
            self.factory.create(record, user, context)
        }));
        let operation = match created {
            Ok(operation) => operation,
            Err(_) => {
                error!(upload_id = record.id, "Operation factory panicked");
                return self.finish_record(record, ResultCode::Unknown).await;
            }
        };

        let code = {
            let _registration = self.registry.register(record.id, operation.clone());
            let progress = |transferred: u64, total: u64| {
                self.notify(Some(record.id), |reporter| {
                    reporter.report_progress(record, transferred, total)
                });
            };

            match AssertUnwindSafe(operation.execute(client, &progress))
                .catch_unwind()
                .await
            {
                Ok(code) => code,
                Err(_) => {
                    error!(upload_id = record.id, "Upload operation panicked");
                    ResultCode::Unknown
                }
            }
        };

        // A cancelled transfer may surface as an I/O error; report who stopped it
        let code = match code {
            ResultCode::Ok => code,
            _ if operation.is_cancelled() && self.shutdown.is_cancelled() => {
                ResultCode::Interrupted
            }
            _ if operation.is_cancelled() => ResultCode::Cancelled,
            _ => code,
        };
        self.finish_record(record, code).await
    }

    async fn finish_record(&self, record: &UploadRecord, code: ResultCode) -> Classification {
        let classification = classify(code);
        debug!(upload_id = record.id, %code, ?classification, "Upload operation finished");

        self.set_status(record.id, status_after(classification, code), Some(code))
            .await;
        self.notify(Some(record.id), |reporter| {
            reporter.report_result(record, classification, code)
        });
        self.emit(BatchEvent::UploadFinished {
            id: record.id,
            account: record.account_name.clone(),
            classification,
            code,
        });
        self.metrics.upload_finished(classification);

        classification
    }

    fn finish_early(&self, result: AggregateResult) -> AggregateResult {
        self.metrics.batch_finished(result);
        result
    }

    async fn set_status(&self, id: u64, status: UploadStatus, code: Option<ResultCode>) {
        if let Err(e) = self.store.update_status(id, status, code).await {
            warn!(upload_id = id, %status, error = %e, "Failed to update upload status");
        }
    }

    /// Reporter failures, panics included, never reach the batch outcome
    fn notify<F>(&self, upload_id: Option<u64>, call: F)
    where
        F: FnOnce(&dyn NotificationReporter) -> notifications::Result<()>,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| call(self.reporter.as_ref()))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(?upload_id, error = %e, "Notification reporter failed"),
            Err(_) => warn!(?upload_id, "Notification reporter panicked"),
        }
    }

    fn emit(&self, event: BatchEvent) {
        if let Err(e) = self.events.emit(event) {
            warn!(error = %e, "Failed to publish batch event");
        }
    }
}

/// Store status for a finished record
fn status_after(classification: Classification, code: ResultCode) -> UploadStatus {
    match classification {
        Classification::Success => UploadStatus::Done,
        Classification::BenignSkip if code == ResultCode::Cancelled => UploadStatus::Cancelled,
        Classification::BenignSkip => UploadStatus::Done,
        Classification::Fatal => UploadStatus::Failed,
        Classification::Retryable => UploadStatus::Pending,
    }
}

#[async_trait]
impl ScheduledJob for UploadWorker {
    async fn execute(&self, input: &InputData) -> AggregateResult {
        match BatchInput::from_input(input) {
            Ok(batch) => self.run(batch).await,
            Err(e) => {
                warn!(error = %e, "Invalid worker input");
                AggregateResult::Failure
            }
        }
    }
}
