//! Application configuration.
//!
//! Settings come from an optional `sensory.toml` (path overridable through
//! `SENSORY_CONFIG`) and are then overridden by environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `8080` |
//! | `METRICS_ENABLED` | `true` |
//! | `STORAGE_TIMEOUT_MS` | `2000` |
//! | `FINGERPRINT_RETENTION_HOURS` | `48` |
//! | `PURGE_INTERVAL_SECS` | `3600` |
//! | `TOP_DEFAULT_DAYS` | `30` |
//! | `SESSION_COOKIE` | `ss_sid` |
//!
//! `FINGERPRINT_RETENTION_HOURS` below 24 and a zero `STORAGE_TIMEOUT_MS`
//! are rejected at load time.
//!
//! Storage backend selection lives in [`crate::db::RepositoryConfig`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "sensory.toml";

/// Fingerprints must outlive the UTC day they dedupe.
pub const MIN_FINGERPRINT_RETENTION_HOURS: u32 = 24;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tracking: TrackingConfig,
    pub session: SessionConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Behaviour of the tracking services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// When false, tracking calls answer `disabled` and write nothing.
    pub metrics_enabled: bool,
    /// Upper bound for every store call made by the services.
    pub storage_timeout_ms: u64,
    /// Age after which dedup fingerprints are purged.
    pub fingerprint_retention_hours: u32,
    /// How often the retention sweeper runs.
    pub purge_interval_secs: u64,
    /// Lookback window for Top-N reports when a request names none.
    pub top_default_days: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            storage_timeout_ms: 2000,
            fingerprint_retention_hours: 48,
            purge_interval_secs: 3600,
            top_default_days: 30,
        }
    }
}

impl TrackingConfig {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn fingerprint_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.fingerprint_retention_hours))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

/// Session identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the opaque session id.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "ss_sid".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load the file (when present) and apply environment overrides.
    ///
    /// A file named by `SENSORY_CONFIG` must exist; the default
    /// `sensory.toml` is optional.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("SENSORY_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tracking = &self.tracking;
        if tracking.fingerprint_retention_hours < MIN_FINGERPRINT_RETENTION_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "FINGERPRINT_RETENTION_HOURS".to_string(),
                value: tracking.fingerprint_retention_hours.to_string(),
            });
        }
        if tracking.storage_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STORAGE_TIMEOUT_MS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Override settings from environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        override_from_env("PORT", &mut self.server.port)?;
        if let Ok(raw) = std::env::var("METRICS_ENABLED") {
            self.tracking.metrics_enabled = parse_bool("METRICS_ENABLED", &raw)?;
        }
        override_from_env("STORAGE_TIMEOUT_MS", &mut self.tracking.storage_timeout_ms)?;
        override_from_env(
            "FINGERPRINT_RETENTION_HOURS",
            &mut self.tracking.fingerprint_retention_hours,
        )?;
        override_from_env("PURGE_INTERVAL_SECS", &mut self.tracking.purge_interval_secs)?;
        override_from_env("TOP_DEFAULT_DAYS", &mut self.tracking.top_default_days)?;
        if let Ok(cookie) = std::env::var("SESSION_COOKIE") {
            self.session.cookie_name = cookie;
        }
        Ok(())
    }

    /// `host:port` string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(raw) = std::env::var(key) {
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
