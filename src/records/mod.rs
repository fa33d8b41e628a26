//! Persisted queue of pending upload records
//!
//! The worker only borrows records for one batch. Reading the batch and
//! writing back per-record status goes through [`UploadStore`]; the
//! Fjall-backed [`FjallUploadStore`] is what the binary uses.

mod model;
mod store;

pub use model::{
    CreatedBy, LocalBehaviour, NameCollisionPolicy, NewUpload, UploadRecord, UploadStatus,
};
pub use store::FjallUploadStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::operation::ResultCode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upload not found: id={0}")]
    NotFound(u64),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Records for `ids` owned by `account`, in the order of `ids`.
    /// Unknown ids and ids of other accounts are skipped.
    async fn get_uploads_by_ids(&self, ids: &[u64], account: &str) -> Result<Vec<UploadRecord>>;

    /// Set status; `last_result` is only overwritten when given
    async fn update_status(
        &self,
        id: u64,
        status: UploadStatus,
        last_result: Option<ResultCode>,
    ) -> Result<()>;

    async fn insert(&self, upload: NewUpload) -> Result<UploadRecord>;

    async fn list(&self, account: &str) -> Result<Vec<UploadRecord>>;

    async fn pending_ids(&self, account: &str) -> Result<Vec<u64>>;
}
