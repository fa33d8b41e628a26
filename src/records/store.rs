use async_trait::async_trait;
use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::model::{NewUpload, UploadRecord, UploadStatus};
use super::{Result, StoreError, UploadStore};
use crate::operation::ResultCode;
use crate::preferences::FjallPreferences;

const NEXT_ID_KEY: &[u8] = b"next_id";

/// Upload queue persisted in a Fjall keyspace
///
/// Layout:
/// - `uploads` partition: u64 id (big-endian) → UploadRecord (JSON)
/// - `metadata` partition: "next_id" → u64 (big-endian)
///
/// Ids start at 1 and are never reused, also across reopen. Records left
/// `InProgress` by a previous process are queued again on open.
#[derive(Clone)]
pub struct FjallUploadStore {
    keyspace: Keyspace,
    uploads: PartitionHandle,
    metadata: PartitionHandle,
    /// Held while an id is taken and the counter persisted
    next_id: Arc<Mutex<u64>>,
}

impl FjallUploadStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening upload store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let uploads = keyspace.open_partition("uploads", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let stored = match metadata.get(NEXT_ID_KEY)? {
            Some(bytes) => decode_id(&bytes)?,
            None => 1,
        };
        let after_last = match uploads.last_key_value()? {
            Some((key, _)) => decode_id(&key)?.saturating_add(1),
            None => 1,
        };
        let next_id = stored.max(after_last);

        let store = Self {
            keyspace,
            uploads,
            metadata,
            next_id: Arc::new(Mutex::new(next_id)),
        };
        let requeued = store.requeue_interrupted()?;

        info!(next_id, requeued, "Upload store opened");
        Ok(store)
    }

    /// Put records stuck `InProgress` back to `Pending`
    fn requeue_interrupted(&self) -> Result<usize> {
        let mut requeued = 0;
        for mut record in self.scan()? {
            if record.status != UploadStatus::InProgress {
                continue;
            }
            warn!(upload_id = record.id, "Requeueing upload interrupted mid-transfer");
            record.status = UploadStatus::Pending;
            record.updated_at = Utc::now();
            self.put(&record)?;
            requeued += 1;
        }
        Ok(requeued)
    }

    pub fn get(&self, id: u64) -> Result<Option<UploadRecord>> {
        match self.uploads.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, record: &UploadRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.uploads.insert(&record.id.to_be_bytes()[..], value)?;
        Ok(())
    }

    /// Remove a record, returns whether it existed
    pub fn remove(&self, id: u64) -> Result<bool> {
        let existed = self.uploads.get(id.to_be_bytes())?.is_some();
        if existed {
            self.uploads.remove(&id.to_be_bytes()[..])?;
            debug!(upload_id = id, "Upload removed");
        }
        Ok(existed)
    }

    /// Preferences stored in the same keyspace, so they persist with the queue
    pub fn preferences(&self) -> Result<FjallPreferences> {
        let partition = self
            .keyspace
            .open_partition("preferences", PartitionCreateOptions::default())?;
        Ok(FjallPreferences::new(partition))
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<UploadRecord>> {
        let mut records = Vec::new();
        for item in self.uploads.iter() {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl UploadStore for FjallUploadStore {
    async fn get_uploads_by_ids(&self, ids: &[u64], account: &str) -> Result<Vec<UploadRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.get(id)? {
                Some(record) if record.account_name == account => records.push(record),
                Some(_) => debug!(upload_id = id, account, "Upload belongs to another account"),
                None => debug!(upload_id = id, account, "Upload not found"),
            }
        }
        Ok(records)
    }

    async fn update_status(
        &self,
        id: u64,
        status: UploadStatus,
        last_result: Option<ResultCode>,
    ) -> Result<()> {
        let mut record = self.get(id)?.ok_or(StoreError::NotFound(id))?;
        record.status = status;
        if last_result.is_some() {
            record.last_result = last_result;
        }
        record.updated_at = Utc::now();
        self.put(&record)?;

        debug!(upload_id = id, %status, "Upload status updated");
        Ok(())
    }

    async fn insert(&self, upload: NewUpload) -> Result<UploadRecord> {
        let record = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            let id = *next_id;
            self.metadata
                .insert(NEXT_ID_KEY, &(id + 1).to_be_bytes()[..])?;
            *next_id = id + 1;

            let record = upload.into_record(id, Utc::now());
            self.put(&record)?;
            record
        };

        debug!(upload_id = record.id, account = %record.account_name, "Upload enqueued");
        Ok(record)
    }

    async fn list(&self, account: &str) -> Result<Vec<UploadRecord>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|record| record.account_name == account)
            .collect())
    }

    async fn pending_ids(&self, account: &str) -> Result<Vec<u64>> {
        Ok(self
            .list(account)
            .await?
            .into_iter()
            .filter(|record| record.status == UploadStatus::Pending)
            .map(|record| record.id)
            .collect())
    }
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::InvalidKey(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}
