//! Backend selection.
//!
//! The binary asks for one store at startup; which one depends on
//! `repository.toml` or the environment.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::repo_config::RepositoryConfig;
use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use super::PostgresConfig;

/// Available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Shared Postgres store
    Postgres,
    /// Process-local in-memory store
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl RepositoryType {
    /// `REPOSITORY_TYPE` when set; otherwise Postgres if a database URL is
    /// present, else Local. An unparseable value falls back to Local.
    pub fn from_env() -> Self {
        match std::env::var("REPOSITORY_TYPE") {
            Ok(val) => val.parse().unwrap_or_else(|e| {
                log::warn!("{}; using the local repository", e);
                Self::Local
            }),
            Err(_) if has_database_url() => Self::Postgres,
            Err(_) => Self::Local,
        }
    }
}

fn has_database_url() -> bool {
    std::env::var_os("DATABASE_URL").is_some() || std::env::var_os("PG_DATABASE_URL").is_some()
}

/// Builds the store handed to [`crate::http::AppState`].
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Build a store of `repo_type`. Postgres needs `postgres_config`.
    pub async fn create(
        repo_type: RepositoryType,
        postgres_config: Option<&PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        match repo_type {
            RepositoryType::Local => Ok(Self::create_local()),
            #[cfg(feature = "postgres-repo")]
            RepositoryType::Postgres => {
                let config = postgres_config.ok_or_else(|| {
                    RepositoryError::configuration("Postgres repository requires a database URL")
                })?;
                let repo: Arc<dyn FullRepository> = Self::create_postgres(config).await?;
                Ok(repo)
            }
            #[cfg(not(feature = "postgres-repo"))]
            RepositoryType::Postgres => {
                let _ = postgres_config;
                Err(RepositoryError::configuration(
                    "Postgres repository feature not enabled",
                ))
            }
        }
    }

    /// Connect and migrate on the blocking pool.
    #[cfg(feature = "postgres-repo")]
    pub async fn create_postgres(
        config: &PostgresConfig,
    ) -> RepositoryResult<Arc<PostgresRepository>> {
        let config = config.clone();
        let repo = tokio::task::spawn_blocking(move || PostgresRepository::new(config))
            .await
            .map_err(|e| RepositoryError::internal(format!("Postgres setup task failed: {}", e)))??;
        Ok(Arc::new(repo))
    }

    pub fn create_local() -> Arc<dyn FullRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Store chosen by [`RepositoryType::from_env`], with Postgres settings
    /// read from `DATABASE_URL` and the `PG_*` variables.
    pub async fn from_env() -> RepositoryResult<Arc<dyn FullRepository>> {
        match RepositoryType::from_env() {
            RepositoryType::Local => Ok(Self::create_local()),
            #[cfg(feature = "postgres-repo")]
            RepositoryType::Postgres => {
                let config = PostgresConfig::from_env().map_err(RepositoryError::configuration)?;
                Self::create(RepositoryType::Postgres, Some(&config)).await
            }
            #[cfg(not(feature = "postgres-repo"))]
            RepositoryType::Postgres => Self::create(RepositoryType::Postgres, None).await,
        }
    }

    /// Store described by a `repository.toml`.
    pub async fn from_config_file<P: AsRef<Path>>(
        config_path: P,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = RepositoryConfig::from_file(config_path)?;
        let repo_type = config
            .repository_type()
            .map_err(RepositoryError::configuration)?;
        let pg_config = match repo_type {
            RepositoryType::Postgres => config.to_postgres_config()?,
            RepositoryType::Local => None,
        };
        Self::create(repo_type, pg_config.as_ref()).await
    }
}
