//! Configuration management for the docrank service
//!
//! Layered configuration: compiled defaults, optional TOML file,
//! `DOCRANK_*` environment overrides, then CLI flags applied by the
//! binary. Every field carries a serde default so partial files work.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Live-update configuration
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the registry snapshot
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding content blobs
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Unconditional periodic flush interval in seconds
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

/// Live-update configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Update poller cadence in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the hub's distribution mailbox
    #[serde(default = "default_broadcast_buffer")]
    pub broadcast_buffer: usize,

    /// Per-observer outbound buffer capacity
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,

    /// Observer liveness deadline in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            upload_dir: default_upload_dir(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            broadcast_buffer: default_broadcast_buffer(),
            observer_buffer: default_observer_buffer(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions for serde
fn default_http_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_flush_interval_secs() -> u64 {
    5
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_broadcast_buffer() -> usize {
    100
}
fn default_observer_buffer() -> usize {
    16
}
fn default_idle_timeout_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default file if present, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if std::path::Path::new("docrank.toml").exists() {
            Self::from_file("docrank.toml")?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment
    /// overrides
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("failed to read config file: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("failed to parse config file: {e}")))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(addr) = env::var("DOCRANK_HTTP_ADDR") {
            self.server.http_addr = addr
                .parse()
                .map_err(|e| Error::config(format!("invalid HTTP address: {e}")))?;
        }
        if let Ok(data_dir) = env::var("DOCRANK_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(upload_dir) = env::var("DOCRANK_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(upload_dir);
        }
        if let Ok(level) = env::var("DOCRANK_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.realtime.poll_interval_ms == 0 {
            return Err(Error::config("poll interval must be non-zero"));
        }
        if self.realtime.broadcast_buffer == 0 || self.realtime.observer_buffer == 0 {
            return Err(Error::config("broadcast buffers must be non-zero"));
        }
        if self.storage.flush_interval_secs == 0 {
            return Err(Error::config("flush interval must be non-zero"));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(Error::config("max upload size must be non-zero"));
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("invalid log level")),
        }
        Ok(())
    }

    /// Path of the registry snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.storage.data_dir.join("documents.json")
    }

    /// Update poller cadence
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.realtime.poll_interval_ms)
    }

    /// Periodic flush interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.storage.flush_interval_secs)
    }

    /// Observer liveness deadline
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.realtime.idle_timeout_secs)
    }
}
