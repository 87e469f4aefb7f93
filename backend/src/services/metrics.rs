//! Daily metric aggregation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use super::fingerprint::{fingerprint, Deduplicator};
use super::{bounded, TrackingError, TrackingResult};
use crate::api::{DailyMetric, EventType, TrackOutcome};
use crate::db::repository::{FullRepository, MetricsRepository};

/// Longest span `daily_metrics` will return, in days.
pub const MAX_METRIC_RANGE_DAYS: i64 = 366;

/// Folds client events into per-entity daily counters.
#[derive(Clone)]
pub struct MetricAggregator {
    repository: Arc<dyn FullRepository>,
    dedup: Deduplicator,
    timeout: Duration,
    enabled: bool,
}

impl MetricAggregator {
    pub fn new(
        repository: Arc<dyn FullRepository>,
        dedup: Deduplicator,
        timeout: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            repository,
            dedup,
            timeout,
            enabled,
        }
    }

    /// Atomically read-modify-write the metric for `(entity_id, date)`.
    pub async fn upsert<F>(
        &self,
        entity_id: &str,
        date: NaiveDate,
        mutator: F,
    ) -> TrackingResult<DailyMetric>
    where
        F: Fn(&mut DailyMetric) + Send + Sync + 'static,
    {
        if !self.enabled {
            return Err(TrackingError::Disabled);
        }
        bounded(
            self.timeout,
            "upsert_daily_metric",
            self.repository
                .upsert_daily_metric(entity_id, date, Arc::new(mutator)),
        )
        .await
    }

    /// Track one event now.
    pub async fn track(
        &self,
        entity_id: &str,
        event_type: &str,
        session_id: &str,
    ) -> TrackingResult<TrackOutcome> {
        self.track_at(entity_id, event_type, session_id, Utc::now())
            .await
    }

    /// Track one event at `at`; the UTC day of `at` selects the counter row.
    ///
    /// Only invalid input is an error. Storage failures are logged and
    /// reported as [`TrackOutcome::NotTracked`].
    pub async fn track_at(
        &self,
        entity_id: &str,
        event_type: &str,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<TrackOutcome> {
        if !self.enabled {
            return Ok(TrackOutcome::Disabled);
        }

        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            return Err(TrackingError::invalid("eventId is required"));
        }
        let event: EventType = event_type.parse().map_err(TrackingError::InvalidInput)?;

        let date = at.date_naive();
        let key = fingerprint(entity_id, date, session_id, event);
        // `recorded` is true only when this call wrote the fingerprint
        let (first_seen, recorded) = match self.dedup.check_and_record_at(&key, at).await {
            Ok(first_seen) => (first_seen, first_seen),
            Err(e) => {
                log::warn!("Dedup unavailable for {}, counting event: {}", key, e);
                (true, false)
            }
        };

        // Repeat views still bump the raw view counter
        if !first_seen && event != EventType::View {
            return Ok(TrackOutcome::Deduped);
        }

        match self
            .upsert(entity_id, date, move |metric| metric.apply(event, first_seen))
            .await
        {
            Ok(metric) => {
                log::debug!(
                    "Tracked {} for {} on {} (views={})",
                    event,
                    entity_id,
                    date,
                    metric.views
                );
                Ok(if first_seen {
                    TrackOutcome::Tracked
                } else {
                    TrackOutcome::Deduped
                })
            }
            Err(e) => {
                log::warn!("Failed to track {} for {}: {}", event, entity_id, e);
                // The count was not written, so the next attempt must be first again
                if recorded {
                    if let Err(e) = self.dedup.forget(&key).await {
                        log::warn!("Could not release fingerprint {}: {}", key, e);
                    }
                }
                Ok(match e {
                    TrackingError::Disabled => TrackOutcome::Disabled,
                    _ => TrackOutcome::NotTracked,
                })
            }
        }
    }

    /// Stored metrics for an entity between `from` and `to` inclusive.
    pub async fn daily_metrics(
        &self,
        entity_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> TrackingResult<Vec<DailyMetric>> {
        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            return Err(TrackingError::invalid("entityId is required"));
        }
        if from > to {
            return Err(TrackingError::invalid("from must not be after to"));
        }
        if (to - from).num_days() >= MAX_METRIC_RANGE_DAYS {
            return Err(TrackingError::invalid(format!(
                "date range must not exceed {} days",
                MAX_METRIC_RANGE_DAYS
            )));
        }

        bounded(
            self.timeout,
            "fetch_daily_metrics",
            self.repository.fetch_daily_metrics(entity_id, from, to),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use chrono::TimeZone;

    fn aggregator(repo: &Arc<LocalRepository>, enabled: bool) -> MetricAggregator {
        let timeout = Duration::from_secs(1);
        MetricAggregator::new(
            repo.clone(),
            Deduplicator::new(repo.clone(), timeout),
            timeout,
            enabled,
        )
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, 12, 0, 0).unwrap()
    }

    async fn metric_for(agg: &MetricAggregator, entity: &str, day: u32) -> DailyMetric {
        let date = noon(day).date_naive();
        agg.daily_metrics(entity, date, date)
            .await
            .unwrap()
            .pop()
            .unwrap()
    }

    #[tokio::test]
    async fn test_repeat_view_counts_views_not_unique_viewers() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);

        let first = agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        let second = agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        agg.track_at("venue-1", "view", "s2", noon(3)).await.unwrap();

        assert_eq!(first, TrackOutcome::Tracked);
        assert_eq!(second, TrackOutcome::Deduped);
        let metric = metric_for(&agg, "venue-1", 3).await;
        assert_eq!(metric.views, 3);
        assert_eq!(metric.unique_viewers, 2);
    }

    #[tokio::test]
    async fn test_repeat_favorite_is_not_counted() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);

        agg.track_at("venue-1", "favorite", "s1", noon(3)).await.unwrap();
        let again = agg.track_at("venue-1", "favorite", "s1", noon(3)).await.unwrap();
        agg.track_at("venue-1", "calendarAdd", "s1", noon(3)).await.unwrap();

        assert_eq!(again, TrackOutcome::Deduped);
        let metric = metric_for(&agg, "venue-1", 3).await;
        assert_eq!(metric.favorites, 1);
        assert_eq!(metric.calendar_adds, 1);
    }

    #[tokio::test]
    async fn test_same_event_next_day_counts_again() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);

        agg.track_at("venue-1", "detailClick", "s1", noon(3)).await.unwrap();
        let next = agg.track_at("venue-1", "detailClick", "s1", noon(4)).await.unwrap();

        assert_eq!(next, TrackOutcome::Tracked);
        assert_eq!(metric_for(&agg, "venue-1", 4).await.detail_clicks, 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);

        let err = agg.track_at("venue-1", "share", "s1", noon(3)).await.unwrap_err();
        assert!(err.is_invalid_input());
        let err = agg.track_at("  ", "view", "s1", noon(3)).await.unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(repo.fingerprint_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_writes_nothing() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, false);

        let outcome = agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        assert_eq!(outcome, TrackOutcome::Disabled);
        assert_eq!(repo.fingerprint_count(), 0);
        assert!(matches!(
            agg.upsert("venue-1", noon(3).date_naive(), |m| m.views += 1).await,
            Err(TrackingError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_to_not_tracked() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);
        repo.set_healthy(false);

        let outcome = agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        assert_eq!(outcome, TrackOutcome::NotTracked);
    }

    #[tokio::test]
    async fn test_failed_write_releases_fingerprint_for_retry() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);
        repo.fail_metric_writes(1);

        let outcome = agg.track_at("venue-1", "favorite", "s1", noon(3)).await.unwrap();
        assert_eq!(outcome, TrackOutcome::NotTracked);
        assert_eq!(repo.fingerprint_count(), 0);

        let retry = agg.track_at("venue-1", "favorite", "s1", noon(3)).await.unwrap();
        assert_eq!(retry, TrackOutcome::Tracked);
        assert_eq!(metric_for(&agg, "venue-1", 3).await.favorites, 1);
    }

    #[tokio::test]
    async fn test_failed_first_view_still_counts_unique_viewer_on_retry() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);
        repo.fail_metric_writes(1);

        agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();

        let metric = metric_for(&agg, "venue-1", 3).await;
        assert_eq!(metric.views, 1);
        assert_eq!(metric.unique_viewers, 1);
    }

    #[tokio::test]
    async fn test_failed_repeat_keeps_earlier_fingerprint() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);
        agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        repo.fail_metric_writes(1);

        let outcome = agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        assert_eq!(outcome, TrackOutcome::NotTracked);
        assert_eq!(repo.fingerprint_count(), 1);

        agg.track_at("venue-1", "view", "s1", noon(3)).await.unwrap();
        let metric = metric_for(&agg, "venue-1", 3).await;
        assert_eq!(metric.views, 2);
        assert_eq!(metric.unique_viewers, 1);
    }

    #[tokio::test]
    async fn test_daily_metrics_rejects_bad_ranges() {
        let repo = Arc::new(LocalRepository::new());
        let agg = aggregator(&repo, true);
        let from = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        assert!(agg.daily_metrics("venue-1", from, to).await.is_err());
        let far = NaiveDate::from_ymd_opt(2028, 1, 1).unwrap();
        assert!(agg.daily_metrics("venue-1", to, far).await.is_err());
        assert!(agg.daily_metrics("venue-1", to, from).await.unwrap().is_empty());
    }
}
