//! Storage for the tracking core.
//!
//! This module provides the abstractions behind every counter, fingerprint and
//! rating via the Repository pattern, allowing the storage backend to be
//! swapped without touching the services.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  HTTP Layer (axum handlers)                             │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services/) - Tracking rules             │
//! │  - Fingerprint deduplication                            │
//! │  - Rating window and aggregation                        │
//! │  - Timeouts and fail-open degradation                   │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/) - Abstract Interface   │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴────────────────┐
//!     │                                │
//! ┌───▼──────────────┐     ┌───────────▼─────────────┐
//! │ Local Repository │     │ Postgres Repository     │
//! │ (in-memory)      │     │ (Diesel, shared store)  │
//! └──────────────────┘     └─────────────────────────┘
//! ```
//!
//! The store is created once by the binary through [`create_repository`] and
//! handed to the HTTP state; nothing in this crate keeps a global instance.

// Feature flag priority: postgres > local
// When multiple features are enabled (e.g., --all-features), postgres takes precedence.
#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use repo_config::RepositoryConfig;

pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    ErrorContext, FullRepository, MetricsRepository, RatingRepository, RepositoryError,
    RepositoryResult, ReportRepository,
};

use std::sync::Arc;

/// Create the repository for this process.
///
/// A `repository.toml` in a standard location wins; otherwise the choice
/// follows `REPOSITORY_TYPE` / `DATABASE_URL` (see [`RepositoryType::from_env`]).
pub async fn create_repository() -> RepositoryResult<Arc<dyn FullRepository>> {
    match RepositoryConfig::find_default_location() {
        Some(path) => {
            log::info!("Using repository configuration from {}", path.display());
            RepositoryFactory::from_config_file(path).await
        }
        None => RepositoryFactory::from_env().await,
    }
}
