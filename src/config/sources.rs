use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "UPLOADBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/uploadbox.toml";
const ENV_PREFIX: &str = "UPLOADBOX";
const ENV_SEPARATOR: &str = "__";

/// Path of the TOML file: `UPLOADBOX_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    load_from_sources(&default_path())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: &Path) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // UPLOADBOX__WORKER__BATCH_SIZE -> worker.batch_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageProvider;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(&config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.worker.batch_size, 20);
        assert_eq!(config.storage.provider, StorageProvider::Local);
        assert!(config.connectivity.connected);
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:9000"

[store]
path = "/var/lib/uploadbox"

[storage]
provider = "memory"

[worker]
chunk_size = "8MB"
metered_chunk_size = "256KB"
batch_size = 5

[scheduler]
max_attempts = 5
jitter = false

[connectivity]
metered = true

[accounts.alice]
display_name = "Alice"
quota = "1GB"

[accounts.bob]
remote_root = "shared/bob"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(&config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.store.path, PathBuf::from("/var/lib/uploadbox"));
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.worker.chunk_size.as_u64(), 8 * 1024 * 1024);
        assert_eq!(config.worker.metered_chunk_size.as_u64(), 256 * 1024);
        assert_eq!(config.worker.batch_size, 5);
        assert_eq!(config.scheduler.max_attempts, 5);
        assert!(!config.scheduler.jitter);
        // untouched keys keep their defaults
        assert_eq!(config.scheduler.backoff_base_ms, 1_000);
        assert!(config.connectivity.metered);

        assert_eq!(config.accounts.len(), 2);
        let alice = &config.accounts["alice"];
        assert_eq!(alice.display_name.as_deref(), Some("Alice"));
        assert_eq!(alice.quota.map(|q| q.as_u64()), Some(1024 * 1024 * 1024));
        assert_eq!(
            config.accounts["bob"].remote_root.as_deref(),
            Some("shared/bob")
        );
    }
}
