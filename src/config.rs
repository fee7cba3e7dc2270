//! TableSync Configuration
//!
//! This module provides configuration structures for the table replication
//! service. Everything here is read once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::MAX_PAGE_SIZE;

/// Main TableSync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSyncConfig {
    /// Primary local store, served to other instances
    pub store: StoreConfig,

    /// Replication configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether this instance pulls from peers and serves its own tables
    #[serde(default)]
    pub enabled: bool,

    /// Minutes between two sweeps
    #[serde(default = "default_period_minutes")]
    pub period_minutes: u64,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Total fetch attempts per page
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout for peer fetches in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upstream instances, polled in this order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One upstream instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Human readable name of the source
    pub label: String,

    /// Base URL of the peer; empty for a comparison-only source
    #[serde(default)]
    pub url: String,

    /// Local database file receiving this source's rows
    pub database: PathBuf,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/tablesync/local.db")
}

fn default_period_minutes() -> u64 {
    30
}

fn default_page_size() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:7777".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_minutes: default_period_minutes(),
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout(),
            sources: Vec::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
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

impl SourceConfig {
    /// A source without URL is kept for offline comparison only
    pub fn is_passive(&self) -> bool {
        self.url.trim().is_empty()
    }
}

impl TableSyncConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: TableSyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(crate::Error::Config("store.path cannot be empty".into()));
        }

        if self.sync.period_minutes == 0 {
            return Err(crate::Error::Config("sync.period_minutes must be positive".into()));
        }
        self.period()?;

        if self.sync.page_size == 0 {
            return Err(crate::Error::Config("sync.page_size must be positive".into()));
        }

        // Peers reject larger pages
        if self.sync.page_size > MAX_PAGE_SIZE {
            return Err(crate::Error::Config(format!(
                "sync.page_size must be at most {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.sync.max_attempts == 0 {
            return Err(crate::Error::Config("sync.max_attempts must be at least 1".into()));
        }

        let mut labels = HashSet::new();
        for source in &self.sync.sources {
            if source.label.trim().is_empty() {
                return Err(crate::Error::Config("sync.sources.label cannot be empty".into()));
            }
            if !labels.insert(source.label.as_str()) {
                return Err(crate::Error::Config(format!(
                    "duplicate sync source label: {}",
                    source.label
                )));
            }
            if source.database.as_os_str().is_empty() {
                return Err(crate::Error::Config(format!(
                    "sync source {} has no database",
                    source.label
                )));
            }
            if !source.is_passive()
                && !(source.url.starts_with("http://") || source.url.starts_with("https://"))
            {
                return Err(crate::Error::Config(format!(
                    "sync source {} url must start with http:// or https://",
                    source.label
                )));
            }
        }

        Ok(())
    }

    /// Get the sweep interval as Duration
    pub fn period(&self) -> crate::Result<Duration> {
        self.sync
            .period_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| crate::Error::Config("sync.period_minutes is too large".into()))
    }

    /// Get the retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.sync.retry_delay_ms)
    }

    /// Get the peer request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.request_timeout_secs)
    }

    /// Number of sources that are actively polled
    pub fn active_sources(&self) -> usize {
        self.sync.sources.iter().filter(|s| !s.is_passive()).count()
    }
}
