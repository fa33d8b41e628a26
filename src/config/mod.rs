//! Configuration management for uploadbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use uploadbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Batch size: {}", config.worker.batch_size);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `UPLOADBOX__<section>__<key>`
//!
//! Examples:
//! - `UPLOADBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `UPLOADBOX__WORKER__CHUNK_SIZE=8MB`
//! - `UPLOADBOX__CONNECTIVITY__METERED=true`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/uploadbox.toml`.
//! This can be overridden using the `UPLOADBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AccountConfig, Config, ConnectivityConfig, SchedulerConfig, ServerConfig, StorageConfig,
    StorageProvider, StoreConfig, WorkerConfig,
};
pub use sources::default_path;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path.as_ref())?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
