//! Repository configuration file support.
//!
//! A `repository.toml` selects the storage backend:
//!
//! ```toml
//! [repository]
//! type = "postgres"
//!
//! [postgres]
//! database_url = "postgres://sensory:secret@db:5432/sensory"
//! max_connections = 10
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::factory::RepositoryType;
use super::repository::RepositoryError;
use crate::db::PostgresConfig;

/// Locations searched for `repository.toml`, in order.
const SEARCH_PATHS: [&str; 3] = [
    "repository.toml",
    "backend/repository.toml",
    "../repository.toml",
];

/// Repository configuration from file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub repository: RepositorySettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection. Kept short: tracking calls
    /// give up quickly rather than queue behind a dead database.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    2
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    50
}

impl RepositoryConfig {
    /// Load repository configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!("Failed to read config file: {}", e))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse repository configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, RepositoryError> {
        toml::from_str(content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// First existing `repository.toml` in the standard locations.
    pub fn find_default_location() -> Option<PathBuf> {
        SEARCH_PATHS
            .into_iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    /// Convert to PostgresConfig if this is a Postgres configuration.
    #[cfg(feature = "postgres-repo")]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if repo_type != RepositoryType::Postgres {
            return Ok(None);
        }

        if self.postgres.database_url.is_empty() {
            return Err(RepositoryError::configuration(
                "Postgres repository requires 'postgres.database_url' setting",
            ));
        }

        Ok(Some(PostgresConfig {
            database_url: self.postgres.database_url.clone(),
            max_pool_size: self.postgres.max_connections,
            min_pool_size: self.postgres.min_connections,
            connection_timeout_sec: self.postgres.connect_timeout,
            idle_timeout_sec: self.postgres.idle_timeout,
            max_retries: self.postgres.max_retries,
            retry_delay_ms: self.postgres.retry_delay_ms,
        }))
    }

    /// Convert to PostgresConfig when the feature is disabled.
    #[cfg(not(feature = "postgres-repo"))]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if repo_type == RepositoryType::Postgres {
            return Err(RepositoryError::configuration(
                "Postgres repository feature not enabled",
            ));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_config() {
        let config = RepositoryConfig::from_toml_str("[repository]\ntype = \"local\"\n").unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
        assert!(config.to_postgres_config().unwrap().is_none());
        assert_eq!(config.postgres.max_connections, 10);
        assert_eq!(config.postgres.connect_timeout, 2);
    }

    #[test]
    fn test_missing_repository_section_is_error() {
        let result = RepositoryConfig::from_toml_str("[postgres]\ndatabase_url = \"x\"\n");
        assert!(matches!(
            result,
            Err(RepositoryError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = RepositoryConfig::from_file("/nonexistent/repository.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[cfg(feature = "postgres-repo")]
    #[test]
    fn test_parse_postgres_config() {
        let toml = r#"
[repository]
type = "postgres"

[postgres]
database_url = "postgres://sensory:secret@db:5432/sensory"
max_connections = 20
connect_timeout = 5
"#;

        let config = RepositoryConfig::from_toml_str(toml).unwrap();
        let pg_config = config.to_postgres_config().unwrap().unwrap();
        assert_eq!(
            pg_config.database_url,
            "postgres://sensory:secret@db:5432/sensory"
        );
        assert_eq!(pg_config.max_pool_size, 20);
        assert_eq!(pg_config.min_pool_size, 1);
        assert_eq!(pg_config.connection_timeout_sec, 5);
    }

    #[cfg(feature = "postgres-repo")]
    #[test]
    fn test_postgres_requires_database_url() {
        let config =
            RepositoryConfig::from_toml_str("[repository]\ntype = \"postgres\"\n").unwrap();
        assert!(config.to_postgres_config().is_err());
    }

    #[cfg(not(feature = "postgres-repo"))]
    #[test]
    fn test_postgres_config_without_feature_is_rejected() {
        let config =
            RepositoryConfig::from_toml_str("[repository]\ntype = \"postgres\"\n").unwrap();
        assert!(config.to_postgres_config().is_err());
    }
}
