use async_trait::async_trait;
use bytes::Bytes;
use object_store::MultipartUpload;
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{OperationContext, OperationFactory, ProgressFn, ResultCode, UploadOperation};
use crate::accounts::User;
use crate::connectivity::ConnectivityOracle;
use crate::humanize::ByteSize;
use crate::records::{NameCollisionPolicy, UploadRecord};
use crate::storage::{StorageClient, StorageError};

/// Highest "name (n).ext" suffix tried before giving up on a rename
const MAX_RENAME_ATTEMPTS: u32 = 999;

/// Streams a local file into storage in fixed-size parts
pub struct StorageUploadOperation {
    record: UploadRecord,
    account_name: String,
    connectivity: Arc<dyn ConnectivityOracle>,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl StorageUploadOperation {
    pub fn new(
        record: UploadRecord,
        account_name: impl Into<String>,
        connectivity: Arc<dyn ConnectivityOracle>,
        chunk_size: ByteSize,
    ) -> Self {
        Self {
            record,
            account_name: account_name.into(),
            connectivity,
            chunk_size: usize::try_from(chunk_size.as_u64())
                .unwrap_or(usize::MAX)
                .max(1),
            cancel: CancellationToken::new(),
        }
    }

    async fn transfer(
        &self,
        client: &StorageClient,
        progress: ProgressFn<'_>,
    ) -> Result<(), ResultCode> {
        if self.record.account_name != self.account_name {
            return Err(ResultCode::AccountMismatch);
        }

        let link = self.connectivity.status();
        if !link.connected {
            return Err(ResultCode::NoNetworkConnection);
        }
        if link.walled {
            return Err(ResultCode::InternetWalled);
        }
        if self.cancel.is_cancelled() {
            return Err(ResultCode::Cancelled);
        }

        let mut file = File::open(&self.record.local_path)
            .await
            .map_err(|e| local_io_code(&e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| local_io_code(&e))?
            .len();

        let target = self.resolve_target(client).await?;

        if let Some(quota) = client.quota_bytes() {
            let used = client.used_bytes().await.map_err(|e| storage_code(&e))?;
            if used.saturating_add(total) > quota {
                info!(
                    upload_id = self.record.id,
                    used,
                    size = total,
                    quota,
                    "Upload would exceed quota"
                );
                return Err(ResultCode::QuotaExceeded);
            }
        }

        let mut upload = client
            .begin_upload(&target)
            .await
            .map_err(|e| storage_code(&e))?;

        if let Err(code) = self
            .send_chunks(&mut file, upload.as_mut(), total, progress)
            .await
        {
            if let Err(e) = upload.abort().await {
                warn!(upload_id = self.record.id, error = %e, "Failed to abort multipart upload");
            }
            return Err(code);
        }

        upload
            .complete()
            .await
            .map_err(|e| storage_code(&StorageError::from(e)))?;

        debug!(
            upload_id = self.record.id,
            remote = %target,
            size = total,
            "Upload completed"
        );

        if self.record.local_behaviour.removes_local_file() {
            if let Err(e) = tokio::fs::remove_file(&self.record.local_path).await {
                warn!(
                    upload_id = self.record.id,
                    path = %self.record.local_path.display(),
                    error = %e,
                    "Uploaded, but failed to remove local file"
                );
            }
        }

        Ok(())
    }

    /// Remote path to write, honouring the collision policy
    async fn resolve_target(&self, client: &StorageClient) -> Result<String, ResultCode> {
        let remote = &self.record.remote_path;
        let taken = client.exists(remote).await.map_err(|e| storage_code(&e))?;
        if !taken {
            return Ok(remote.clone());
        }

        match self.record.name_collision_policy {
            NameCollisionPolicy::Overwrite => Ok(remote.clone()),
            NameCollisionPolicy::Skip => Err(ResultCode::AlreadyExistsSkipped),
            NameCollisionPolicy::AskUser => Err(ResultCode::SyncConflict),
            NameCollisionPolicy::Rename => {
                for n in 2..=MAX_RENAME_ATTEMPTS {
                    let candidate = numbered_name(remote, n);
                    if !client.exists(&candidate).await.map_err(|e| storage_code(&e))? {
                        return Ok(candidate);
                    }
                }
                Err(ResultCode::SyncConflict)
            }
        }
    }

    async fn send_chunks(
        &self,
        file: &mut File,
        upload: &mut dyn MultipartUpload,
        total: u64,
        progress: ProgressFn<'_>,
    ) -> Result<(), ResultCode> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ResultCode::Cancelled);
            }

            let n = fill_buffer(file, &mut buf)
                .await
                .map_err(|e| local_io_code(&e))?;
            if n == 0 {
                break;
            }

            let part = upload.put_part(Bytes::copy_from_slice(&buf[..n]).into());
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ResultCode::Cancelled),
                res = part => res.map_err(|e| storage_code(&StorageError::from(e)))?,
            }

            sent += n as u64;
            progress(sent, total);

            if n < buf.len() {
                break;
            }
        }

        if sent == 0 {
            progress(0, total);
        }
        Ok(())
    }
}

#[async_trait]
impl UploadOperation for StorageUploadOperation {
    fn upload_id(&self) -> u64 {
        self.record.id
    }

    async fn execute(&self, client: &StorageClient, progress: ProgressFn<'_>) -> ResultCode {
        match self.transfer(client, progress).await {
            Ok(()) => ResultCode::Ok,
            Err(code) => code,
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Builds [`StorageUploadOperation`]s, picking the chunk size from the link
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageOperationFactory;

impl OperationFactory for StorageOperationFactory {
    fn create(
        &self,
        record: &UploadRecord,
        user: &User,
        context: &OperationContext,
    ) -> Arc<dyn UploadOperation> {
        Arc::new(StorageUploadOperation::new(
            record.clone(),
            user.account_name.clone(),
            context.connectivity.clone(),
            context.effective_chunk_size(),
        ))
    }
}

/// Read until the buffer is full or the file ends
async fn fill_buffer(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// "dir/photo.jpg" → "dir/photo (n).jpg"
fn numbered_name(path: &str, n: u32) -> String {
    let (dir, name) = match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    };

    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = name.split_at(dot);
            format!("{dir}{stem} ({n}){ext}")
        }
        _ => format!("{dir}{name} ({n})"),
    }
}

fn local_io_code(e: &io::Error) -> ResultCode {
    match e.kind() {
        io::ErrorKind::NotFound => ResultCode::LocalFileNotFound,
        _ => ResultCode::LocalFileNotReadable,
    }
}

fn storage_code(e: &StorageError) -> ResultCode {
    match e {
        StorageError::ObjectStore(object_store::Error::PermissionDenied { .. })
        | StorageError::ObjectStore(object_store::Error::Unauthenticated { .. }) => {
            ResultCode::Forbidden
        }
        StorageError::ObjectStore(object_store::Error::NotFound { .. }) => ResultCode::ServerError,
        _ => ResultCode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityStatus, StaticConnectivity};
    use crate::records::{LocalBehaviour, NewUpload};
    use chrono::Utc;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn record_for(local: &Path, remote: &str) -> UploadRecord {
        NewUpload::new("alice", local, remote).into_record(1, Utc::now())
    }

    fn operation(record: UploadRecord, chunk: ByteSize) -> StorageUploadOperation {
        StorageUploadOperation::new(record, "alice", Arc::new(StaticConnectivity::online()), chunk)
    }

    fn write_local(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_uploads_in_chunks_with_progress() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "a.bin", &[7u8; 10]);
        let client = StorageClient::in_memory().for_user(&User::new("alice"));

        let op = operation(record_for(&local, "/up/a.bin"), ByteSize(4));
        let seen = Mutex::new(Vec::new());
        let progress = |sent: u64, total: u64| seen.lock().unwrap().push((sent, total));

        let code = op.execute(&client, &progress).await;

        assert_eq!(code, ResultCode::Ok);
        assert_eq!(*seen.lock().unwrap(), vec![(4, 10), (8, 10), (10, 10)]);
        assert_eq!(client.download("up/a.bin").await.unwrap(), vec![7u8; 10]);
        assert!(local.exists());
    }

    #[tokio::test]
    async fn test_move_removes_local_file() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "m.txt", b"move me");
        let client = StorageClient::in_memory();

        let mut record = record_for(&local, "m.txt");
        record.local_behaviour = LocalBehaviour::Move;

        let code = operation(record, ByteSize::kib(1)).execute(&client, &|_, _| {}).await;

        assert_eq!(code, ResultCode::Ok);
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_connectivity_codes() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "c.txt", b"x");
        let client = StorageClient::in_memory();
        let oracle = Arc::new(StaticConnectivity::new(ConnectivityStatus::OFFLINE));

        let op = StorageUploadOperation::new(
            record_for(&local, "c.txt"),
            "alice",
            oracle.clone(),
            ByteSize::kib(1),
        );
        assert_eq!(
            op.execute(&client, &|_, _| {}).await,
            ResultCode::NoNetworkConnection
        );

        oracle.set(ConnectivityStatus {
            walled: true,
            ..ConnectivityStatus::ONLINE
        });
        assert_eq!(op.execute(&client, &|_, _| {}).await, ResultCode::InternetWalled);
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let dir = TempDir::new().unwrap();
        let client = StorageClient::in_memory();

        let op = operation(
            record_for(&dir.path().join("nope.txt"), "nope.txt"),
            ByteSize::kib(1),
        );
        assert_eq!(
            op.execute(&client, &|_, _| {}).await,
            ResultCode::LocalFileNotFound
        );
    }

    #[tokio::test]
    async fn test_collision_policies() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "p.jpg", b"new");
        let client = StorageClient::in_memory();
        client.upload("pics/p.jpg", b"old".to_vec()).await.unwrap();

        let mut record = record_for(&local, "pics/p.jpg");

        record.name_collision_policy = NameCollisionPolicy::Skip;
        let code = operation(record.clone(), ByteSize::kib(1))
            .execute(&client, &|_, _| {})
            .await;
        assert_eq!(code, ResultCode::AlreadyExistsSkipped);

        record.name_collision_policy = NameCollisionPolicy::AskUser;
        let code = operation(record.clone(), ByteSize::kib(1))
            .execute(&client, &|_, _| {})
            .await;
        assert_eq!(code, ResultCode::SyncConflict);

        record.name_collision_policy = NameCollisionPolicy::Rename;
        let code = operation(record.clone(), ByteSize::kib(1))
            .execute(&client, &|_, _| {})
            .await;
        assert_eq!(code, ResultCode::Ok);
        assert_eq!(client.download("pics/p (2).jpg").await.unwrap(), b"new");
        assert_eq!(client.download("pics/p.jpg").await.unwrap(), b"old");

        record.name_collision_policy = NameCollisionPolicy::Overwrite;
        let code = operation(record, ByteSize::kib(1))
            .execute(&client, &|_, _| {})
            .await;
        assert_eq!(code, ResultCode::Ok);
        assert_eq!(client.download("pics/p.jpg").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "q.bin", &[0u8; 8]);
        let storage = StorageClient::in_memory();
        let client = storage.for_user(&User::new("alice").with_quota(10));
        client.upload("existing.bin", vec![0u8; 4]).await.unwrap();

        let code = operation(record_for(&local, "q.bin"), ByteSize::kib(1))
            .execute(&client, &|_, _| {})
            .await;
        assert_eq!(code, ResultCode::QuotaExceeded);
        assert!(!client.exists("q.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "x.txt", b"x");
        let client = StorageClient::in_memory();

        let op = operation(record_for(&local, "x.txt"), ByteSize::kib(1));
        op.cancel();

        assert!(op.is_cancelled());
        assert_eq!(op.execute(&client, &|_, _| {}).await, ResultCode::Cancelled);
        assert!(!client.exists("x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_between_chunks_aborts_upload() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "big.bin", &[1u8; 16]);
        let client = StorageClient::in_memory();

        let op = Arc::new(operation(record_for(&local, "big.bin"), ByteSize(4)));
        let handle = op.clone();
        let progress = move |sent: u64, _total: u64| {
            if sent >= 8 {
                handle.cancel();
            }
        };

        assert_eq!(op.execute(&client, &progress).await, ResultCode::Cancelled);
        assert!(!client.exists("big.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_account_mismatch() {
        let dir = TempDir::new().unwrap();
        let local = write_local(&dir, "x.txt", b"x");
        let op = StorageUploadOperation::new(
            record_for(&local, "x.txt"),
            "bob",
            Arc::new(StaticConnectivity::online()),
            ByteSize::kib(1),
        );

        assert_eq!(
            op.execute(&StorageClient::in_memory(), &|_, _| {}).await,
            ResultCode::AccountMismatch
        );
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("dir/photo.jpg", 2), "dir/photo (2).jpg");
        assert_eq!(numbered_name("README", 3), "README (3)");
        assert_eq!(numbered_name("/a/.bashrc", 2), "/a/.bashrc (2)");
        assert_eq!(numbered_name("a.b/c", 2), "a.b/c (2)");
    }
}
