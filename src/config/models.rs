use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    /// Known accounts keyed by account name
    #[serde(default)]
    pub accounts: HashMap<String, AccountConfig>,
}

/// Control API server
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Upload record store (fjall keyspace)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/uploads")
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
}

/// Remote storage uploads are written to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Root directory for the `local` provider
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/remote")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
    /// Chunk size used on metered connections
    #[serde(default = "default_metered_chunk_size")]
    pub metered_chunk_size: ByteSize,
    /// Upload ids per worker invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How often `serve` looks for pending uploads
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            metered_chunk_size: default_metered_chunk_size(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_chunk_size() -> ByteSize {
    ByteSize::mib(4)
}

fn default_metered_chunk_size() -> ByteSize {
    ByteSize::kib(512)
}

fn default_batch_size() -> usize {
    20
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

/// Retry policy applied to `Retry` outcomes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Pick each delay at random below the exponential cap
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_jitter() -> bool {
    true
}

/// Initial link state for the static connectivity oracle
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_connected")]
    pub connected: bool,
    #[serde(default)]
    pub walled: bool,
    #[serde(default)]
    pub metered: bool,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            connected: default_connected(),
            walled: false,
            metered: false,
        }
    }
}

fn default_connected() -> bool {
    true
}

/// One account's settings; the map key is the account name
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountConfig {
    pub display_name: Option<String>,
    /// Folder under the storage root; defaults to the account name
    pub remote_root: Option<String>,
    pub quota: Option<ByteSize>,
}
