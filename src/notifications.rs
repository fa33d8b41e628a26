//! User-facing upload notifications
//!
//! The worker calls the reporter inline for every record. A reporter error is
//! logged by the worker and never changes the batch outcome.

use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::humanize::describe_progress;
use crate::operation::{Classification, ResultCode};
use crate::records::UploadRecord;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

/// Per-batch tally handed to [`NotificationReporter::report_batch_summary`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retryable: usize,
    /// Cancelled or skipped by collision policy
    pub skipped: usize,
    /// Left untouched after a fatal short-circuit
    pub not_processed: usize,
}

impl BatchCounts {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Success => self.succeeded += 1,
            Classification::Fatal => self.failed += 1,
            Classification::Retryable => self.retryable += 1,
            Classification::BenignSkip => self.skipped += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.retryable + self.skipped
    }

    /// Fix `not_processed` once the loop is over
    pub fn finish(&mut self) {
        self.not_processed = self.total.saturating_sub(self.processed());
    }
}

pub trait NotificationReporter: Send + Sync {
    fn report_start(&self, record: &UploadRecord) -> Result<()>;

    fn report_progress(&self, record: &UploadRecord, transferred: u64, total: u64) -> Result<()>;

    fn report_result(
        &self,
        record: &UploadRecord,
        classification: Classification,
        code: ResultCode,
    ) -> Result<()>;

    fn report_batch_summary(&self, account: &str, counts: &BatchCounts) -> Result<()>;
}

/// Reporter that writes notifications to the log
#[derive(Debug, Default)]
pub struct TracingReporter;

impl NotificationReporter for TracingReporter {
    fn report_start(&self, record: &UploadRecord) -> Result<()> {
        info!(
            upload_id = record.id,
            account = %record.account_name,
            file = record.file_name(),
            "Upload started"
        );
        Ok(())
    }

    fn report_progress(&self, record: &UploadRecord, transferred: u64, total: u64) -> Result<()> {
        tracing::debug!(
            upload_id = record.id,
            file = record.file_name(),
            "{}",
            describe_progress(transferred, total)
        );
        Ok(())
    }

    fn report_result(
        &self,
        record: &UploadRecord,
        classification: Classification,
        code: ResultCode,
    ) -> Result<()> {
        match classification {
            Classification::Success => {
                info!(upload_id = record.id, file = record.file_name(), "Upload finished")
            }
            // Skips are not failures from the user's point of view
            Classification::BenignSkip => {
                info!(upload_id = record.id, %code, "Upload skipped")
            }
            Classification::Retryable => {
                warn!(upload_id = record.id, %code, "Upload interrupted, will retry")
            }
            Classification::Fatal => {
                warn!(upload_id = record.id, %code, "Upload failed")
            }
        }
        Ok(())
    }

    fn report_batch_summary(&self, account: &str, counts: &BatchCounts) -> Result<()> {
        if counts.failed > 0 || counts.retryable > 0 {
            warn!(
                account,
                succeeded = counts.succeeded,
                failed = counts.failed,
                retryable = counts.retryable,
                not_processed = counts.not_processed,
                "Upload batch finished with problems"
            );
        } else {
            info!(
                account,
                succeeded = counts.succeeded,
                skipped = counts.skipped,
                "Upload batch finished"
            );
        }
        Ok(())
    }
}

/// One call captured by [`RecordingReporter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Started(u64),
    Progress { id: u64, transferred: u64, total: u64 },
    Finished { id: u64, classification: Classification },
    Summary(BatchCounts),
}

/// Reporter that keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    fn push(&self, notification: Notification) -> Result<()> {
        self.seen
            .lock()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?
            .push(notification);
        Ok(())
    }
}

impl NotificationReporter for RecordingReporter {
    fn report_start(&self, record: &UploadRecord) -> Result<()> {
        self.push(Notification::Started(record.id))
    }

    fn report_progress(&self, record: &UploadRecord, transferred: u64, total: u64) -> Result<()> {
        self.push(Notification::Progress {
            id: record.id,
            transferred,
            total,
        })
    }

    fn report_result(
        &self,
        record: &UploadRecord,
        classification: Classification,
        _code: ResultCode,
    ) -> Result<()> {
        self.push(Notification::Finished {
            id: record.id,
            classification,
        })
    }

    fn report_batch_summary(&self, _account: &str, counts: &BatchCounts) -> Result<()> {
        self.push(Notification::Summary(*counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NewUpload;
    use chrono::Utc;

    fn record(id: u64) -> UploadRecord {
        NewUpload::new("account", "/tmp/a.jpg", "/photos/a.jpg").into_record(id, Utc::now())
    }

    #[test]
    fn test_batch_counts_tally() {
        let mut counts = BatchCounts::new(5);
        counts.record(Classification::Success);
        counts.record(Classification::Retryable);
        counts.record(Classification::BenignSkip);
        counts.record(Classification::Fatal);
        counts.finish();

        assert_eq!(counts.processed(), 4);
        assert_eq!(counts.not_processed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
    }

    #[test]
    fn test_tracing_reporter_never_fails() {
        let reporter = TracingReporter;
        let record = record(1);

        assert!(reporter.report_start(&record).is_ok());
        assert!(reporter.report_progress(&record, 10, 100).is_ok());
        assert!(
            reporter
                .report_result(&record, Classification::Fatal, ResultCode::QuotaExceeded)
                .is_ok()
        );
        assert!(
            reporter
                .report_batch_summary("account", &BatchCounts::new(1))
                .is_ok()
        );
    }

    #[test]
    fn test_recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        let record = record(7);

        reporter.report_start(&record).unwrap();
        reporter
            .report_result(&record, Classification::Success, ResultCode::Ok)
            .unwrap();

        assert_eq!(
            reporter.notifications(),
            vec![
                Notification::Started(7),
                Notification::Finished {
                    id: 7,
                    classification: Classification::Success
                },
            ]
        );
    }
}
