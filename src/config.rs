//! Configuration module for rssfeed.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{Result, RssfeedError};

/// Environment variable overriding `notify.admin_email`.
pub const ADMIN_EMAIL_ENV: &str = "RSSFEED_ADMIN_EMAIL";

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/rssfeed.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
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
    "logs/rssfeed.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Refresh engine and scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Additional attempts after the first one, for fetches and for failed entries.
    #[serde(default = "default_maximum_retry")]
    pub maximum_retry: u32,
    /// Fixed delay between attempts in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Scheduler tick interval in seconds.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Entries older than this many days are hidden from readers.
    #[serde(default = "default_days_retrievable")]
    pub days_retrievable: i64,
}

fn default_maximum_retry() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    2
}

fn default_update_interval() -> u64 {
    300 // 5 minutes
}

fn default_days_retrievable() -> i64 {
    7
}

impl RefreshConfig {
    /// Delay inserted between two attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Scheduler tick interval.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Retention window for read-facing queries.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.days_retrievable)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            maximum_retry: default_maximum_retry(),
            retry_delay_secs: default_retry_delay(),
            update_interval_secs: default_update_interval(),
            days_retrievable: default_days_retrievable(),
        }
    }
}

/// Feed fetcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum description length in characters.
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Allow loopback and private network hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_description_length() -> usize {
    10000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    concat!("rssfeed/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_feed_size_bytes: default_max_feed_size(),
            max_description_length: default_max_description_length(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            allow_private_hosts: false,
        }
    }
}

/// Failure notification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Address that receives a copy of every escalation notice.
    #[serde(default)]
    pub admin_email: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Refresh configuration.
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Fetcher configuration.
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Notification configuration.
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RssfeedError::Io)?;
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
        toml::from_str(s).map_err(|e| RssfeedError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `RSSFEED_ADMIN_EMAIL`: Override the admin notification address
    pub fn apply_env_overrides(&mut self) {
        if let Ok(email) = std::env::var(ADMIN_EMAIL_ENV) {
            if !email.is_empty() {
                self.notify.admin_email = Some(email);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.refresh.update_interval_secs == 0 {
            return Err(RssfeedError::Config(
                "refresh.update_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.refresh.days_retrievable < 0 {
            return Err(RssfeedError::Config(
                "refresh.days_retrievable must not be negative".to_string(),
            ));
        }
        if let Some(email) = &self.notify.admin_email {
            if !email.contains('@') {
                return Err(RssfeedError::Config(format!(
                    "notify.admin_email is not an e-mail address: {email}"
                )));
            }
        }
        Ok(())
    }
}
