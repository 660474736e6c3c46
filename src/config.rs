//! Configuration for welltick

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::WelltickError;

/// Minimum length accepted for the JWT signing secret outside dev mode
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("welltick")
}

/// Which content store backs encrypted payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentBackend {
    /// Content-addressed files under `storage_dir/blobs`
    Local,
    /// IPFS node or pinning service reached over its RPC API
    Ipfs,
}

/// What create/update do when the content store rejects a private payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Fail the request; no row is written
    Reject,
    /// Log a warning and write the row without a payload
    Degrade,
}

/// Content store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: ContentBackend,

    /// Base URL of the IPFS RPC API (without `/api/v0`)
    #[serde(default = "default_ipfs_api_url")]
    pub ipfs_api_url: String,

    /// Basic-auth user for hosted IPFS (Infura project id)
    #[serde(default)]
    pub ipfs_project_id: Option<String>,

    /// Basic-auth password for hosted IPFS
    #[serde(default)]
    pub ipfs_project_secret: Option<String>,

    /// Request timeout for IPFS calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_on_failure")]
    pub on_failure: StoreFailurePolicy,
}

fn default_backend() -> ContentBackend {
    ContentBackend::Local
}

fn default_ipfs_api_url() -> String {
    "https://ipfs.infura.io:5001".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_on_failure() -> StoreFailurePolicy {
    StoreFailurePolicy::Reject
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ipfs_api_url: default_ipfs_api_url(),
            ipfs_project_id: None,
            ipfs_project_secret: None,
            timeout_secs: default_timeout_secs(),
            on_failure: default_on_failure(),
        }
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for the database and local blobs
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// HS256 secret for bearer tokens
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Bearer token lifetime
    #[serde(default = "default_jwt_expiry_secs")]
    pub jwt_expiry_secs: u64,

    /// Allows running without a JWT secret
    #[serde(default)]
    pub dev_mode: bool,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Minimum half-over-half change before a metric trend leaves "stable"
    #[serde(default = "default_trend_tolerance")]
    pub trend_tolerance: f64,

    #[serde(default)]
    pub content_store: ContentStoreConfig,
}

fn default_http_port() -> u16 {
    5000
}

fn default_jwt_expiry_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_trend_tolerance() -> f64 {
    0.1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            jwt_secret: None,
            jwt_expiry_secs: default_jwt_expiry_secs(),
            dev_mode: false,
            max_body_bytes: default_max_body_bytes(),
            trend_tolerance: default_trend_tolerance(),
            content_store: ContentStoreConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Check settings that would otherwise fail at first use
    pub fn validate(&self) -> Result<(), WelltickError> {
        match self.jwt_secret.as_deref() {
            Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                return Err(WelltickError::Config(format!(
                    "JWT_SECRET must be at least {} characters",
                    MIN_JWT_SECRET_LEN
                )));
            }
            None if !self.dev_mode => {
                return Err(WelltickError::Config(
                    "JWT_SECRET is required unless dev_mode is enabled".into(),
                ));
            }
            _ => {}
        }

        if !self.trend_tolerance.is_finite() || self.trend_tolerance < 0.0 {
            return Err(WelltickError::Config(
                "trend_tolerance must be a non-negative number".into(),
            ));
        }

        if self.content_store.backend == ContentBackend::Ipfs {
            url::Url::parse(&self.content_store.ipfs_api_url).map_err(|e| {
                WelltickError::Config(format!("Invalid ipfs_api_url: {}", e))
            })?;
        }

        Ok(())
    }

    /// Get blobs directory
    pub fn blobs_dir(&self) -> PathBuf {
        self.storage_dir.join("blobs")
    }

    /// Get SQLite database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("welltick.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            http_port = 8080
            dev_mode = true

            [content_store]
            backend = "ipfs"
            on_failure = "degrade"
            "#,
        )
        .unwrap();

        assert_eq!(config.http_port, 8080);
        assert_eq!(config.jwt_expiry_secs, 604800);
        assert_eq!(config.trend_tolerance, 0.1);
        assert_eq!(config.content_store.backend, ContentBackend::Ipfs);
        assert_eq!(config.content_store.on_failure, StoreFailurePolicy::Degrade);
        assert_eq!(config.content_store.timeout_secs, 30);
    }

    #[test]
    fn test_cli_values_match_config_names() {
        use clap::ValueEnum;

        assert_eq!(ContentBackend::from_str("ipfs", false).unwrap(), ContentBackend::Ipfs);
        assert_eq!(
            StoreFailurePolicy::from_str("degrade", false).unwrap(),
            StoreFailurePolicy::Degrade
        );
        assert!(StoreFailurePolicy::from_str("retry", false).is_err());

        for backend in ContentBackend::value_variants() {
            let name = backend.to_possible_value().unwrap();
            let toml_name = serde_json::to_value(backend).unwrap();
            assert_eq!(toml_name, name.get_name());
        }
    }

    #[test]
    fn test_validate_requires_secret_outside_dev_mode() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.jwt_secret = Some("short".into());
        assert!(config.validate().is_err());

        config.jwt_secret = Some("a-secret-that-is-long-enough-for-hs256!".into());
        assert!(config.validate().is_ok());

        let dev = Config {
            dev_mode: true,
            ..Config::default()
        };
        assert!(dev.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            dev_mode: true,
            ..Config::default()
        };

        config.save(config.config_path()).unwrap();
        let loaded = Config::load(config.config_path()).unwrap();

        assert_eq!(loaded.storage_dir, config.storage_dir);
        assert_eq!(loaded.db_path(), dir.path().join("welltick.db"));
    }
}
