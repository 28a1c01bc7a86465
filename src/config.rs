//! Configuration module for fsbucket.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::{ConflictPolicy, StorageRoot};
use crate::{BucketError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Accepted API keys. Authentication is disabled when empty.
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Rate limit for API endpoints (requests per minute per client).
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,
    /// Key rate limits by `X-Forwarded-For` / `X-Real-IP`. Enable only
    /// behind a reverse proxy that sets these headers itself.
    #[serde(default)]
    pub trust_proxy_headers: bool,
    /// Serve files under `/public/` without authentication.
    #[serde(default = "default_public_downloads")]
    pub public_downloads: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_size() -> u64 {
    100
}

fn default_api_rate_limit() -> u32 {
    600
}

fn default_public_downloads() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size_mb: default_max_upload_size(),
            cors_origins: vec![],
            api_keys: vec![],
            api_rate_limit: default_api_rate_limit(),
            trust_proxy_headers: false,
            public_downloads: default_public_downloads(),
        }
    }
}

impl ServerConfig {
    /// Upload limit in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

/// Storage engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the bucket. Created on startup if absent.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Whether symbolic links inside the root may be traversed.
    #[serde(default)]
    pub follow_symlinks: bool,
    /// What an upload does when the target file already exists.
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

fn default_storage_root() -> String {
    "data/storage".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            follow_symlinks: false,
            on_conflict: ConflictPolicy::default(),
        }
    }
}

impl StorageConfig {
    /// Create the root directory if needed and canonicalize it.
    pub fn open_root(&self) -> Result<StorageRoot> {
        let root = PathBuf::from(&self.root);
        fs::create_dir_all(&root)?;

        let canonical = fs::canonicalize(&root)?;
        if !canonical.is_dir() {
            return Err(BucketError::Config(format!(
                "storage root {} is not a directory",
                canonical.display()
            )));
        }

        Ok(StorageRoot::new(canonical, self.follow_symlinks))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/fsbucket.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(BucketError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BucketError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FSBUCKET_ROOT`: Override the storage root directory
    /// - `FSBUCKET_API_KEY`: Add an accepted API key
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("FSBUCKET_ROOT") {
            if !root.is_empty() {
                self.storage.root = root;
            }
        }

        if let Ok(key) = std::env::var("FSBUCKET_API_KEY") {
            if !key.is_empty() && !self.server.api_keys.contains(&key) {
                self.server.api_keys.push(key);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim().is_empty() {
            return Err(BucketError::Config("storage.root must not be empty".to_string()));
        }
        if self.server.max_upload_size_mb == 0 {
            return Err(BucketError::Config(
                "server.max_upload_size_mb must be greater than zero".to_string(),
            ));
        }
        if self.server.api_rate_limit == 0 {
            return Err(BucketError::Config(
                "server.api_rate_limit must be greater than zero".to_string(),
            ));
        }
        if self.server.api_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(BucketError::Config(
                "server.api_keys must not contain empty keys".to_string(),
            ));
        }
        Ok(())
    }
}
