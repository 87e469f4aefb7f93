//! Service layer for the tracking rules.
//!
//! The services sit between the HTTP handlers and the repository. They own
//! validation, deduplication, the rating window and failure degradation; the
//! repository only guarantees per-key atomicity.
//!
//! Every store call goes through [`bounded`], so a slow or dead store turns
//! into [`TrackingError::StorageUnavailable`] after the configured timeout
//! instead of holding the request.

pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod ratings;
pub mod reports;
pub mod retention;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TrackingConfig;
use crate::db::repository::{FullRepository, RepositoryError, RepositoryResult};

pub use error::{TrackingError, TrackingResult};
pub use fingerprint::Deduplicator;
pub use metrics::MetricAggregator;
pub use ratings::RatingAggregator;
pub use reports::TopReporter;

/// Run a repository call under the storage timeout.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> TrackingResult<T>
where
    F: Future<Output = RepositoryResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TrackingError::StorageUnavailable(e.with_operation(operation))),
        Err(_) => Err(TrackingError::StorageUnavailable(
            RepositoryError::timeout(format!(
                "store did not answer within {} ms",
                timeout.as_millis()
            ))
            .with_operation(operation),
        )),
    }
}

/// All tracking services wired to one store.
#[derive(Clone)]
pub struct TrackingService {
    pub dedup: Deduplicator,
    pub metrics: MetricAggregator,
    pub ratings: RatingAggregator,
    pub reports: TopReporter,
    config: TrackingConfig,
}

impl TrackingService {
    pub fn new(repository: Arc<dyn FullRepository>, config: TrackingConfig) -> Self {
        let timeout = config.storage_timeout();
        let dedup = Deduplicator::new(repository.clone(), timeout);
        Self {
            metrics: MetricAggregator::new(
                repository.clone(),
                dedup.clone(),
                timeout,
                config.metrics_enabled,
            ),
            ratings: RatingAggregator::new(repository.clone(), timeout),
            reports: TopReporter::new(
                repository,
                timeout,
                config.metrics_enabled,
                config.top_default_days,
            ),
            dedup,
            config,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn metrics_enabled(&self) -> bool {
        self.config.metrics_enabled
    }
}
