//! Metrics repository trait for daily counters and fingerprints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::error::RepositoryResult;
use crate::api::DailyMetric;

/// Mutation applied to a daily metric inside the store's critical section.
///
/// `Fn` rather than `FnOnce` so backends that retry a transaction can run it
/// again against a fresh read.
pub type MetricMutator = Arc<dyn Fn(&mut DailyMetric) + Send + Sync>;

/// Repository trait for per-entity daily metrics and the fingerprint set.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Check that the store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    // ==================== Daily Metrics ====================

    /// Read-modify-write the metric for `(entity_id, date)`.
    ///
    /// The mutator receives the stored metric, or a zero-initialised one when
    /// the key is new. The whole operation is atomic with respect to other
    /// callers on the same key.
    ///
    /// # Returns
    /// * `Ok(DailyMetric)` - The metric after the mutation
    /// * `Err(RepositoryError)` - If the operation fails
    async fn upsert_daily_metric(
        &self,
        entity_id: &str,
        date: NaiveDate,
        mutator: MetricMutator,
    ) -> RepositoryResult<DailyMetric>;

    /// Fetch stored metrics for an entity between `from` and `to` inclusive,
    /// ascending by date. Days without activity are absent.
    async fn fetch_daily_metrics(
        &self,
        entity_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<DailyMetric>>;

    // ==================== Fingerprints ====================

    /// Whether `key` has been recorded and not yet purged.
    async fn has_fingerprint(&self, key: &str) -> RepositoryResult<bool>;

    /// Record `key` if absent.
    ///
    /// # Returns
    /// * `Ok(true)` - The key was new and is now recorded
    /// * `Ok(false)` - The key was already present
    async fn record_fingerprint(&self, key: &str, at: DateTime<Utc>) -> RepositoryResult<bool>;

    /// Delete a single fingerprint so the event it guards can be counted again.
    ///
    /// Returns whether the key was present.
    async fn remove_fingerprint(&self, key: &str) -> RepositoryResult<bool>;

    /// Delete fingerprints recorded before `cutoff`.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of fingerprints removed
    async fn purge_fingerprints(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize>;
}
