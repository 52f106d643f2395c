//! Server configuration.
//!
//! Reads TOML from `orderdesk.toml` in the working directory, or from the
//! file named by `ORDERDESK_CONFIG`. A missing file yields the defaults;
//! a malformed one is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use orderdesk_transfer::UploadLimits;
use orderdesk_upload_server::{ServiceConfig, SweepConfig};

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "ORDERDESK_CONFIG";

/// Config file looked up when `ORDERDESK_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "orderdesk.toml";

/// Top-level config file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub uploads: UploadsSection,
    pub catalog: CatalogSection,
}

/// `[server]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub public_base_url: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            public_base_url: "http://localhost:8080".into(),
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
        }
    }
}

/// `[uploads]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadsSection {
    pub chunk_size: u64,
    pub max_chunk_bytes: u64,
    pub max_total_chunks: u32,
    pub max_file_size: u64,
    pub max_filename_len: usize,
    pub session_max_age_hours: u64,
    pub sweep_interval_secs: u64,
    pub completion_lease_secs: u64,
}

impl Default for UploadsSection {
    fn default() -> Self {
        let limits = UploadLimits::default();
        let sweep = SweepConfig::default();
        Self {
            chunk_size: limits.chunk_size,
            max_chunk_bytes: limits.max_chunk_bytes,
            max_total_chunks: limits.max_total_chunks,
            max_file_size: limits.max_file_size,
            max_filename_len: limits.max_filename_len,
            session_max_age_hours: sweep.max_age.as_secs() / 3600,
            sweep_interval_secs: sweep.interval.as_secs(),
            completion_lease_secs: ServiceConfig::default().completion_lease.as_secs(),
        }
    }
}

/// `[catalog]`: ids of the orders and products uploads may attach to.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub orders: Vec<u64>,
    pub products: Vec<u64>,
}

impl ServerConfig {
    /// Loads the file named by `ORDERDESK_CONFIG`, or `orderdesk.toml`.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Loads `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let u = &self.uploads;
        if u.sweep_interval_secs == 0 {
            anyhow::bail!("uploads.sweep_interval_secs must be at least 1");
        }
        if u.chunk_size == 0 || u.max_chunk_bytes == 0 {
            anyhow::bail!("uploads.chunk_size and uploads.max_chunk_bytes must be positive");
        }
        Ok(())
    }

    pub fn limits(&self) -> UploadLimits {
        let u = &self.uploads;
        UploadLimits {
            chunk_size: u.chunk_size,
            max_chunk_bytes: u.max_chunk_bytes,
            max_total_chunks: u.max_total_chunks,
            max_file_size: u.max_file_size,
            max_filename_len: u.max_filename_len,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            public_base_url: self.server.public_base_url.clone(),
            limits: self.limits(),
            completion_lease: Duration::from_secs(self.uploads.completion_lease_secs),
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.uploads.sweep_interval_secs),
            max_age: Duration::from_secs(self.uploads.session_max_age_hours.saturating_mul(3600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.storage.root, PathBuf::from("./storage"));
        assert_eq!(config.limits(), UploadLimits::default());
        assert_eq!(config.uploads.session_max_age_hours, 24);
        assert_eq!(config.uploads.sweep_interval_secs, 3600);
        assert_eq!(config.uploads.completion_lease_secs, 300);
        assert!(config.catalog.orders.is_empty());

        let sweep = config.sweep_config();
        assert_eq!(sweep, SweepConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            bind = "127.0.0.1:9000"

            [uploads]
            max_total_chunks = 50
            session_max_age_hours = 2

            [catalog]
            orders = [1, 2]
            products = [10]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.public_base_url, "http://localhost:8080");
        assert_eq!(config.uploads.max_total_chunks, 50);
        assert_eq!(config.uploads.chunk_size, 1_048_576);
        assert_eq!(config.sweep_config().max_age, Duration::from_secs(7200));
        assert_eq!(config.catalog.orders, vec![1, 2]);
        assert_eq!(config.catalog.products, vec![10]);
    }

    #[test]
    fn service_config_carries_url_and_lease() {
        let mut config = ServerConfig::default();
        config.server.public_base_url = "https://shop.example".into();
        config.uploads.completion_lease_secs = 30;

        let service = config.service_config();
        assert_eq!(service.public_base_url, "https://shop.example");
        assert_eq!(service.completion_lease, Duration::from_secs(30));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orderdesk.toml");
        std::fs::write(&path, "[uploads]\nsweep_interval_secs = 0\n").unwrap();

        let err = ServerConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("sweep_interval_secs"));
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orderdesk.toml");
        std::fs::write(&path, "[uploads]\nmax_total_chunks = \"many\"\n").unwrap();
        assert!(ServerConfig::load_from(&path).is_err());
    }
}
