//! Single-file upload operations
//!
//! The worker never talks to storage directly. For each queued record it asks
//! an [`OperationFactory`] for an [`UploadOperation`], runs it, and feeds the
//! returned [`ResultCode`] through [`classify`].
//!
//! ## Key Components
//!
//! - [`ResultCode`] / [`Classification`] / [`classify`] - outcome buckets
//! - [`UploadOperation`] - one cancellable transfer
//! - [`OperationFactory`] - builds operations from record, user and context
//! - [`StorageUploadOperation`] - chunked upload into a [`StorageClient`]

mod result;
mod storage_upload;

pub use result::{Classification, ResultCode, classify};
pub use storage_upload::{StorageOperationFactory, StorageUploadOperation};

use async_trait::async_trait;
use std::sync::Arc;

use crate::accounts::User;
use crate::connectivity::ConnectivityOracle;
use crate::humanize::ByteSize;
use crate::records::UploadRecord;
use crate::storage::StorageClient;

/// Progress callback: `(bytes_transferred, total_bytes)`
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

#[async_trait]
pub trait UploadOperation: Send + Sync {
    fn upload_id(&self) -> u64;

    /// Run the transfer. Errors are folded into the returned code.
    async fn execute(&self, client: &StorageClient, progress: ProgressFn<'_>) -> ResultCode;

    /// Ask an in-flight (or not yet started) transfer to stop
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

pub trait OperationFactory: Send + Sync {
    fn create(
        &self,
        record: &UploadRecord,
        user: &User,
        context: &OperationContext,
    ) -> Arc<dyn UploadOperation>;
}

/// Worker-side context handed to the factory for every record
#[derive(Clone)]
pub struct OperationContext {
    pub connectivity: Arc<dyn ConnectivityOracle>,
    pub chunk_size: ByteSize,
    /// Chunk size used while the connection is metered
    pub metered_chunk_size: ByteSize,
    pub batch_index: u32,
    pub total_batches: u32,
}

impl OperationContext {
    /// Chunk size for the current link
    pub fn effective_chunk_size(&self) -> ByteSize {
        if self.connectivity.status().metered {
            self.metered_chunk_size
        } else {
            self.chunk_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityStatus, StaticConnectivity};

    #[test]
    fn test_metered_link_uses_smaller_chunks() {
        let connectivity = Arc::new(StaticConnectivity::online());
        let ctx = OperationContext {
            connectivity: connectivity.clone(),
            chunk_size: ByteSize::mib(4),
            metered_chunk_size: ByteSize::kib(512),
            batch_index: 0,
            total_batches: 1,
        };

        assert_eq!(ctx.effective_chunk_size(), ByteSize::mib(4));

        connectivity.set(ConnectivityStatus {
            metered: true,
            ..ConnectivityStatus::ONLINE
        });
        assert_eq!(ctx.effective_chunk_size(), ByteSize::kib(512));
    }
}
