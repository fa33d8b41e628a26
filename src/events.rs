//! Batch progress events for in-process observers
//!
//! Publication is fire-and-forget: the worker logs emitter errors and moves
//! on, and nothing in the control flow reads these events back.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::notifications::BatchCounts;
use crate::operation::{Classification, ResultCode};
use crate::worker::AggregateResult;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Event channel closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchStarted {
        account: String,
        batch_index: u32,
        total_batches: u32,
        queued: usize,
    },
    UploadFinished {
        id: u64,
        account: String,
        classification: Classification,
        code: ResultCode,
    },
    BatchFinished {
        account: String,
        result: AggregateResult,
        counts: BatchCounts,
    },
}

pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: BatchEvent) -> Result<(), EmitError>;
}

/// Emitter backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    sender: broadcast::Sender<BatchEvent>,
}

impl BroadcastEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: BatchEvent) -> Result<(), EmitError> {
        // No listeners is the common case, not an error
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| EmitError::Closed)
    }
}
