//! Remote object storage the uploads land in
//! Uses Apache Arrow object_store crate

use futures_util::TryStreamExt;
use object_store::{MultipartUpload, ObjectStore, local::LocalFileSystem, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::accounts::User;
use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid remote path: {0:?}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Client over an object store, optionally scoped to one account's folder
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    root: Vec<String>,
    quota_bytes: Option<u64>,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("root", &self.root.join("/"))
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}

impl StorageClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            root: Vec::new(),
            quota_bytes: None,
        }
    }

    /// In-memory storage for tests and dry runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// Storage rooted at a local directory, created if missing
    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::in_memory()),
            StorageProvider::Local => Self::local(&config.root),
        }
    }

    /// Client confined to the user's remote root and carrying its quota
    pub fn for_user(&self, user: &User) -> Self {
        let mut root = self.root.clone();
        root.extend(segments(&user.remote_root).map(String::from));
        Self {
            store: self.store.clone(),
            root,
            quota_bytes: user.quota_bytes,
        }
    }

    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    fn object_path(&self, key: &str) -> Result<StoragePath> {
        let key_segments: Vec<&str> = segments(key).collect();
        if key_segments.is_empty() {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(StoragePath::from_iter(
            self.root.iter().map(String::as_str).chain(key_segments),
        ))
    }

    fn root_path(&self) -> Option<StoragePath> {
        if self.root.is_empty() {
            None
        } else {
            Some(StoragePath::from_iter(self.root.iter().map(String::as_str)))
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Total size of everything under this client's root
    pub async fn used_bytes(&self) -> Result<u64> {
        let prefix = self.root_path();
        let total = self
            .store
            .list(prefix.as_ref())
            .try_fold(0u64, |acc, meta| async move {
                Ok::<_, object_store::Error>(acc + meta.size as u64)
            })
            .await?;
        Ok(total)
    }

    /// Start a chunked upload; the caller completes or aborts it
    pub async fn begin_upload(&self, key: &str) -> Result<Box<dyn MultipartUpload>> {
        let path = self.object_path(key)?;
        Ok(self.store.put_multipart(&path).await?)
    }

    /// Single-shot upload for small payloads
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.object_path(key)?;
        let size = data.len();
        self.store.put(&path, data.into()).await?;

        tracing::debug!(key, size, "Uploaded to storage");
        Ok(())
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        let bytes = self.store.get(&path).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Non-empty path segments, so "/a//b/" and "a/b" address the same object
fn segments(path: &str) -> impl Iterator<Item = &str> + '_ {
    path.split('/').filter(|segment| !segment.is_empty())
}
