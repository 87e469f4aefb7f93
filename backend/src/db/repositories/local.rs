//! In-memory local repository implementation.
//!
//! All tables live behind a single `RwLock`. Every read-modify-write runs under
//! one write guard, which makes the lock the single-writer serialisation point
//! for the whole store. Suitable for tests and single-process deployments; a
//! horizontally scaled deployment needs the Postgres backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{
    DailyMetric, HitDimension, NewRating, Rating, RatingAggregate, RatingUpsert, TopEntry,
};
use crate::db::repository::*;

/// In-memory local repository.
///
/// # Example
/// ```
/// use sensory_search::db::repositories::LocalRepository;
///
/// let repo = LocalRepository::new();
/// assert_eq!(repo.fingerprint_count(), 0);
/// assert_eq!(repo.rating_count("venue-1"), 0);
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

#[derive(Debug, Clone, Copy)]
struct HitCounter {
    hits: u64,
    last_hit_at: DateTime<Utc>,
}

struct LocalData {
    daily_metrics: HashMap<(String, NaiveDate), DailyMetric>,
    fingerprints: HashMap<String, DateTime<Utc>>,

    // Ratings grouped by listing, plus the aggregate recomputed on each write
    ratings: HashMap<String, Vec<Rating>>,
    rating_aggregates: HashMap<String, RatingAggregate>,

    hits: HashMap<(HitDimension, String, NaiveDate), HitCounter>,

    // Fault injection
    is_healthy: bool,
    latency: Option<Duration>,
    failing_metric_writes: usize,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            daily_metrics: HashMap::new(),
            fingerprints: HashMap::new(),
            ratings: HashMap::new(),
            rating_aggregates: HashMap::new(),
            hits: HashMap::new(),
            is_healthy: true,
            latency: None,
            failing_metric_writes: 0,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    ///
    /// While unhealthy every operation fails with a connection error.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Delay every operation, for testing storage timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.data.write().latency = latency;
    }

    /// Make the next `count` daily metric writes fail with a connection error
    /// while every other operation keeps working.
    pub fn fail_metric_writes(&self, count: usize) {
        self.data.write().failing_metric_writes = count;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            latency: data.latency,
            failing_metric_writes: data.failing_metric_writes,
            ..Default::default()
        };
    }

    /// Number of fingerprints currently held.
    pub fn fingerprint_count(&self) -> usize {
        self.data.read().fingerprints.len()
    }

    /// Number of stored ratings for a listing.
    pub fn rating_count(&self, listing_id: &str) -> usize {
        self.data
            .read()
            .ratings
            .get(listing_id)
            .map_or(0, Vec::len)
    }

    async fn simulate(&self, operation: &str) -> RepositoryResult<()> {
        let (healthy, latency) = {
            let data = self.data.read();
            (data.is_healthy, data.latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if !healthy {
            return Err(RepositoryError::connection_with_context(
                "Local repository marked unhealthy",
                ErrorContext::new(operation),
            ));
        }

        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn upsert_daily_metric(
        &self,
        entity_id: &str,
        date: NaiveDate,
        mutator: MetricMutator,
    ) -> RepositoryResult<DailyMetric> {
        self.simulate("upsert_daily_metric").await?;

        let mut data = self.data.write();
        if data.failing_metric_writes > 0 {
            data.failing_metric_writes -= 1;
            return Err(RepositoryError::connection_with_context(
                "Injected metric write failure",
                ErrorContext::new("upsert_daily_metric"),
            ));
        }
        let metric = data
            .daily_metrics
            .entry((entity_id.to_string(), date))
            .or_insert_with(|| DailyMetric::new(entity_id, date));
        mutator(metric);
        Ok(metric.clone())
    }

    async fn fetch_daily_metrics(
        &self,
        entity_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<DailyMetric>> {
        self.simulate("fetch_daily_metrics").await?;

        let data = self.data.read();
        let mut metrics: Vec<DailyMetric> = data
            .daily_metrics
            .values()
            .filter(|m| m.entity_id == entity_id && m.date >= from && m.date <= to)
            .cloned()
            .collect();
        metrics.sort_by_key(|m| m.date);
        Ok(metrics)
    }

    async fn has_fingerprint(&self, key: &str) -> RepositoryResult<bool> {
        self.simulate("has_fingerprint").await?;
        Ok(self.data.read().fingerprints.contains_key(key))
    }

    async fn record_fingerprint(&self, key: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        self.simulate("record_fingerprint").await?;

        let mut data = self.data.write();
        if data.fingerprints.contains_key(key) {
            return Ok(false);
        }
        data.fingerprints.insert(key.to_string(), at);
        Ok(true)
    }

    async fn remove_fingerprint(&self, key: &str) -> RepositoryResult<bool> {
        self.simulate("remove_fingerprint").await?;
        Ok(self.data.write().fingerprints.remove(key).is_some())
    }

    async fn purge_fingerprints(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        self.simulate("purge_fingerprints").await?;

        let mut data = self.data.write();
        let before = data.fingerprints.len();
        data.fingerprints.retain(|_, recorded_at| *recorded_at >= cutoff);
        Ok(before - data.fingerprints.len())
    }
}

#[async_trait]
impl RatingRepository for LocalRepository {
    async fn upsert_rating(
        &self,
        rating: NewRating,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<RatingUpsert> {
        self.simulate("upsert_rating").await?;

        let mut guard = self.data.write();
        let data = &mut *guard;
        let listing_ratings = data.ratings.entry(rating.listing_id.clone()).or_default();

        let existing = listing_ratings
            .iter_mut()
            .filter(|r| r.session_id == rating.session_id && r.created_at >= window_start)
            .max_by_key(|r| r.created_at);

        let upsert = match existing {
            Some(stored) => {
                stored.value = rating.value;
                if rating.user_id.is_some() {
                    stored.user_id = rating.user_id;
                }
                stored.created_at = now;
                RatingUpsert {
                    rating: stored.clone(),
                    inserted: false,
                }
            }
            None => {
                let stored = Rating {
                    id: Uuid::new_v4().to_string(),
                    listing_id: rating.listing_id.clone(),
                    session_id: rating.session_id,
                    user_id: rating.user_id,
                    value: rating.value,
                    created_at: now,
                };
                listing_ratings.push(stored.clone());
                RatingUpsert {
                    rating: stored,
                    inserted: true,
                }
            }
        };

        let aggregate = RatingAggregate::from_values(listing_ratings.iter().map(|r| r.value));
        data.rating_aggregates.insert(rating.listing_id, aggregate);

        Ok(upsert)
    }

    async fn find_recent_rating(
        &self,
        listing_id: &str,
        session_id: &str,
        window_start: DateTime<Utc>,
    ) -> RepositoryResult<Option<Rating>> {
        self.simulate("find_recent_rating").await?;

        let data = self.data.read();
        Ok(data.ratings.get(listing_id).and_then(|ratings| {
            ratings
                .iter()
                .filter(|r| r.session_id == session_id && r.created_at >= window_start)
                .max_by_key(|r| r.created_at)
                .cloned()
        }))
    }

    async fn fetch_rating_aggregate(&self, listing_id: &str) -> RepositoryResult<RatingAggregate> {
        self.simulate("fetch_rating_aggregate").await?;

        Ok(self
            .data
            .read()
            .rating_aggregates
            .get(listing_id)
            .cloned()
            .unwrap_or_else(RatingAggregate::empty))
    }
}

#[async_trait]
impl ReportRepository for LocalRepository {
    async fn record_hit(
        &self,
        dimension: HitDimension,
        key: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        self.simulate("record_hit").await?;

        let mut data = self.data.write();
        let counter = data
            .hits
            .entry((dimension, key.to_string(), at.date_naive()))
            .or_insert(HitCounter {
                hits: 0,
                last_hit_at: at,
            });
        counter.hits += 1;
        counter.last_hit_at = counter.last_hit_at.max(at);
        Ok(counter.hits)
    }

    async fn fetch_top_hits(
        &self,
        dimension: HitDimension,
        since: NaiveDate,
        limit: usize,
    ) -> RepositoryResult<Vec<TopEntry>> {
        self.simulate("fetch_top_hits").await?;

        let data = self.data.read();
        let mut totals: HashMap<&str, TopEntry> = HashMap::new();
        for ((dim, key, date), counter) in &data.hits {
            if *dim != dimension || *date < since {
                continue;
            }
            totals
                .entry(key.as_str())
                .and_modify(|entry| {
                    entry.count += counter.hits;
                    entry.last_seen = entry.last_seen.max(counter.last_hit_at);
                })
                .or_insert_with(|| TopEntry {
                    key: key.clone(),
                    count: counter.hits,
                    last_seen: counter.last_hit_at,
                });
        }

        let mut entries: Vec<TopEntry> = totals.into_values().collect();
        entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.key.cmp(&b.key))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}
