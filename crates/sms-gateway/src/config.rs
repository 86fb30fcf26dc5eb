//! Configuration for the SMS gateway.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sms_code::LookupPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Record storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// API key configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Code lookup tuning
    #[serde(default)]
    pub lookup: LookupConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_url")]
    pub database_url: PathBuf,

    /// Enable persistence (if false, records are kept in memory only)
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in the X-API-Key header
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    /// How old a message may be and still supply a code
    #[serde(default = "default_recency_window", with = "humantime_serde")]
    pub recency_window: Duration,

    /// Newest records examined per lookup query
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Delay between lookup attempts while waiting
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Wait timeout in seconds when the client does not send one
    #[serde(default = "default_wait_timeout")]
    pub default_wait_timeout: i64,

    /// Largest wait timeout in seconds a client may request
    #[serde(default = "default_max_wait_timeout")]
    pub max_wait_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Global requests per minute
    #[serde(default = "default_global_rpm")]
    pub global_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            persist: true,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            recency_window: default_recency_window(),
            candidate_limit: default_candidate_limit(),
            poll_interval: default_poll_interval(),
            default_wait_timeout: default_wait_timeout(),
            max_wait_timeout: default_max_wait_timeout(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_minute: default_global_rpm(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8322
}

fn default_database_url() -> PathBuf {
    PathBuf::from("data/sms_database.db")
}

fn default_true() -> bool {
    true
}

fn default_recency_window() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_candidate_limit() -> usize {
    5
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_wait_timeout() -> i64 {
    5
}

fn default_max_wait_timeout() -> u64 {
    120
}

fn default_global_rpm() -> u32 {
    600
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl LookupConfig {
    /// Lookup policy handed to the code service.
    pub fn policy(&self) -> LookupPolicy {
        LookupPolicy {
            recency_window: self.recency_window,
            candidate_limit: self.candidate_limit,
            poll_interval: self.poll_interval,
            max_wait: Duration::from_secs(self.max_wait_timeout),
        }
    }
}

impl AuthConfig {
    /// Configured key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    // API keys made of digits must stay strings
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject lookup settings that would make waits spin or never match.
    pub fn validate(&self) -> Result<()> {
        let lookup = &self.lookup;
        if lookup.poll_interval.is_zero() {
            bail!("LOOKUP__POLL_INTERVAL must be greater than zero");
        }
        if lookup.candidate_limit == 0 {
            bail!("LOOKUP__CANDIDATE_LIMIT must be at least 1");
        }
        if lookup.recency_window.is_zero() {
            bail!("LOOKUP__RECENCY_WINDOW must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.server.port, 8322);
        assert!(config.storage.persist);
        assert!(config.auth.api_key().is_none());
        assert_eq!(config.lookup.default_wait_timeout, 5);
        assert_eq!(config.lookup.policy(), LookupPolicy::default());
    }

    #[test]
    fn test_blank_api_key_disables_auth() {
        let auth = AuthConfig {
            api_key: Some("   ".into()),
        };
        assert!(auth.api_key().is_none());

        let auth = AuthConfig {
            api_key: Some("s3cret".into()),
        };
        assert_eq!(auth.api_key(), Some("s3cret"));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.lookup.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config.lookup.poll_interval = Duration::from_millis(200);
        config.lookup.candidate_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_humantime_durations() {
        let lookup: LookupConfig = serde_json::from_str(
            r#"{"recency_window": "5m", "poll_interval": "500ms", "max_wait_timeout": 30}"#,
        )
        .unwrap();

        assert_eq!(lookup.recency_window, Duration::from_secs(300));
        assert_eq!(lookup.poll_interval, Duration::from_millis(500));
        assert_eq!(lookup.candidate_limit, 5);
        assert_eq!(lookup.policy().max_wait, Duration::from_secs(30));
    }
}
