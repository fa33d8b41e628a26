//! Upload worker
//!
//! One invocation processes one batch of queued uploads for one account,
//! strictly in store order, and reports a tri-state [`AggregateResult`] back
//! to whatever scheduled it. The worker never retries on its own: `Retry` is
//! advice for the host.
//!
//! ## Key Components
//!
//! - [`BatchInput`] / [`InputData`] - invocation parameters, typed and raw
//! - [`UploadWorker`] - orchestration over injected collaborators
//! - [`ScheduledJob`] - narrow adapter the host scheduler calls

mod input;
mod runner;

pub use input::{
    ACCOUNT, BatchInput, CURRENT_BATCH_INDEX, InputData, InputError, TOTAL_UPLOAD_SIZE,
    UPLOAD_IDS,
};
pub use runner::UploadWorker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of one worker invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateResult {
    /// Nothing left to do for this batch
    Success,
    /// Do not reschedule; something needs user attention
    Failure,
    /// Transient trouble; the host may reschedule
    Retry,
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AggregateResult::Success => "success",
            AggregateResult::Failure => "failure",
            AggregateResult::Retry => "retry",
        };
        f.write_str(label)
    }
}

/// Entry point a host work scheduler invokes
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn execute(&self, input: &InputData) -> AggregateResult;
}
