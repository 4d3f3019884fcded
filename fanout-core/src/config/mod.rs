//! Configuration management for the fan-out engine
//!
//! Configuration comes from defaults, an optional TOML file and
//! `FANOUT_<SECTION>_<KEY>` environment variables, and is validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch store configuration
    pub store: StoreConfig,

    /// Fan-out and retraction behaviour
    pub broadcast: BroadcastConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Batch store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// Enable WAL (Write-Ahead Log) journaling
    pub enable_wal: bool,

    /// How long a writer waits for a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,

    /// How long a batch may stay broadcasting or claimed before a retraction
    /// may take it over
    #[serde(with = "humantime_serde")]
    pub claim_lease: Duration,
}

/// Fan-out and retraction behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Transport calls allowed in flight per broadcast or retraction
    pub max_concurrency: usize,

    /// Deadline for a single copy or delete
    #[serde(with = "humantime_serde")]
    pub transport_timeout: Duration,

    /// Chat whose forwarded channel posts register the channel
    pub registration_chat_id: Option<i64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./fanout.db"),
            pool_size: 4,
            enable_wal: true,
            busy_timeout: Duration::from_secs(5),
            claim_lease: Duration::from_secs(600),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            transport_timeout: Duration::from_secs(10),
            registration_chat_id: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: FANOUT_<SECTION>_<KEY>
    /// Example: FANOUT_STORE_DB_PATH=/var/lib/fanout/fanout.db
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a variable lookup onto this configuration
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // Store config
        if let Some(path) = lookup("FANOUT_STORE_DB_PATH") {
            self.store.db_path = PathBuf::from(path);
        }
        if let Some(size) = parse_var(&lookup, "FANOUT_STORE_POOL_SIZE")? {
            self.store.pool_size = size;
        }
        if let Some(wal) = parse_var(&lookup, "FANOUT_STORE_ENABLE_WAL")? {
            self.store.enable_wal = wal;
        }
        if let Some(secs) = parse_var(&lookup, "FANOUT_STORE_BUSY_TIMEOUT_SECS")? {
            self.store.busy_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "FANOUT_STORE_CLAIM_LEASE_SECS")? {
            self.store.claim_lease = Duration::from_secs(secs);
        }

        // Broadcast config
        if let Some(max) = parse_var(&lookup, "FANOUT_BROADCAST_MAX_CONCURRENCY")? {
            self.broadcast.max_concurrency = max;
        }
        if let Some(secs) = parse_var(&lookup, "FANOUT_BROADCAST_TRANSPORT_TIMEOUT_SECS")? {
            self.broadcast.transport_timeout = Duration::from_secs(secs);
        }
        if let Some(chat) = parse_var(&lookup, "FANOUT_BROADCAST_REGISTRATION_CHAT_ID")? {
            self.broadcast.registration_chat_id = Some(chat);
        }

        // Logging config
        if let Some(level) = lookup("FANOUT_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(json) = parse_var(&lookup, "FANOUT_LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.store.db_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "db_path must not be empty".to_string(),
            ));
        }

        if self.store.claim_lease.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "claim_lease must be greater than 0".to_string(),
            ));
        }

        if self.broadcast.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.broadcast.transport_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "transport_timeout must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast.max_concurrency, 8);
        assert_eq!(config.broadcast.transport_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.store.pool_size = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.broadcast.max_concurrency = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.broadcast.transport_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.store.claim_lease = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(lookup(&[
                ("FANOUT_STORE_DB_PATH", "/tmp/other.db"),
                ("FANOUT_STORE_POOL_SIZE", "2"),
                ("FANOUT_STORE_CLAIM_LEASE_SECS", "120"),
                ("FANOUT_BROADCAST_MAX_CONCURRENCY", "16"),
                ("FANOUT_BROADCAST_TRANSPORT_TIMEOUT_SECS", "3"),
                ("FANOUT_BROADCAST_REGISTRATION_CHAT_ID", "-100123"),
                ("FANOUT_LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();

        assert_eq!(config.store.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.store.pool_size, 2);
        assert_eq!(config.store.claim_lease, Duration::from_secs(120));
        assert_eq!(config.broadcast.max_concurrency, 16);
        assert_eq!(config.broadcast.transport_timeout, Duration::from_secs(3));
        assert_eq!(config.broadcast.registration_chat_id, Some(-100123));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_rejects_bad_number() {
        let mut config = Config::default();
        let err = config
            .apply_env(lookup(&[("FANOUT_BROADCAST_MAX_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "FANOUT_BROADCAST_MAX_CONCURRENCY", .. }
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanout.toml");

        let mut config = Config::default();
        config.broadcast.registration_chat_id = Some(-42);
        config.broadcast.transport_timeout = Duration::from_secs(30);
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.broadcast.registration_chat_id, Some(-42));
        assert_eq!(loaded.broadcast.transport_timeout, Duration::from_secs(30));
        assert_eq!(loaded.store.db_path, config.store.db_path);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [broadcast]
            max_concurrency = 2
            transport_timeout = "750ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.broadcast.max_concurrency, 2);
        assert_eq!(config.broadcast.transport_timeout, Duration::from_millis(750));
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.logging.level, "info");
    }
}
