//! Star ratings with a one-per-session rolling window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{bounded, TrackingError, TrackingResult};
use crate::api::{NewRating, Rating, RatingAggregate, MAX_RATING, MIN_RATING};
use crate::db::repository::{FullRepository, RatingRepository};

/// Length of the "already rated" window, in hours.
pub const RATING_WINDOW_HOURS: i64 = 24;

fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::hours(RATING_WINDOW_HOURS)
}

fn require_id<'a>(value: &'a str, field: &str) -> TrackingResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrackingError::invalid(format!("{} is required", field)));
    }
    Ok(value)
}

/// Writes ratings and answers aggregate queries.
#[derive(Clone)]
pub struct RatingAggregator {
    repository: Arc<dyn FullRepository>,
    timeout: Duration,
}

impl RatingAggregator {
    pub fn new(repository: Arc<dyn FullRepository>, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    /// Add or replace the session's rating for a listing.
    pub async fn add_rating(
        &self,
        listing_id: &str,
        session_id: &str,
        value: i64,
        user_id: Option<String>,
    ) -> TrackingResult<Rating> {
        self.add_rating_at(listing_id, session_id, value, user_id, Utc::now())
            .await
    }

    /// Add a rating as of `now`.
    ///
    /// A rating by the same session within the last 24 hours is overwritten
    /// in place (same id, new value and timestamp); otherwise a new rating is
    /// stored. The listing aggregate is recomputed by the store on every
    /// write.
    pub async fn add_rating_at(
        &self,
        listing_id: &str,
        session_id: &str,
        value: i64,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> TrackingResult<Rating> {
        let listing_id = require_id(listing_id, "listingId")?;
        let session_id = require_id(session_id, "sessionId")?;
        let value = u8::try_from(value)
            .ok()
            .filter(|v| (MIN_RATING..=MAX_RATING).contains(v))
            .ok_or_else(|| {
                TrackingError::invalid(format!(
                    "value must be between {} and {}",
                    MIN_RATING, MAX_RATING
                ))
            })?;
        let user_id = user_id
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let rating = NewRating {
            listing_id: listing_id.to_string(),
            session_id: session_id.to_string(),
            user_id,
            value,
        };

        let upsert = bounded(
            self.timeout,
            "upsert_rating",
            self.repository
                .upsert_rating(rating, window_start(now), now),
        )
        .await?;

        log::info!(
            "{} rating {} for listing {} ({} stars)",
            if upsert.inserted { "Stored" } else { "Updated" },
            upsert.rating.id,
            listing_id,
            value
        );

        Ok(upsert.rating)
    }

    /// Mean, count and histogram for a listing. Unknown listings are empty.
    pub async fn aggregate(&self, listing_id: &str) -> TrackingResult<RatingAggregate> {
        let listing_id = require_id(listing_id, "listingId")?;
        bounded(
            self.timeout,
            "fetch_rating_aggregate",
            self.repository.fetch_rating_aggregate(listing_id),
        )
        .await
    }

    /// The session's rating from the last 24 hours, if any.
    pub async fn user_rating(
        &self,
        listing_id: &str,
        session_id: &str,
    ) -> TrackingResult<Option<Rating>> {
        self.user_rating_at(listing_id, session_id, Utc::now()).await
    }

    pub async fn user_rating_at(
        &self,
        listing_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> TrackingResult<Option<Rating>> {
        let listing_id = require_id(listing_id, "listingId")?;
        let session_id = require_id(session_id, "sessionId")?;
        bounded(
            self.timeout,
            "find_recent_rating",
            self.repository
                .find_recent_rating(listing_id, session_id, window_start(now)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use chrono::TimeZone;

    fn ratings(repo: &Arc<LocalRepository>) -> RatingAggregator {
        RatingAggregator::new(repo.clone(), Duration::from_secs(1))
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i64::from(hour))
    }

    #[tokio::test]
    async fn test_second_rating_inside_window_replaces_first() {
        let repo = Arc::new(LocalRepository::new());
        let svc = ratings(&repo);

        let first = svc.add_rating_at("L1", "S1", 2, None, at(0)).await.unwrap();
        let second = svc.add_rating_at("L1", "S1", 5, None, at(10)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.value, 5);
        assert_eq!(second.created_at, at(10));
        let agg = svc.aggregate("L1").await.unwrap();
        assert_eq!(agg.count, 1);
        assert_eq!(agg.avg, Some(5.0));
    }

    #[tokio::test]
    async fn test_rating_after_window_adds_new_entry() {
        let repo = Arc::new(LocalRepository::new());
        let svc = ratings(&repo);

        svc.add_rating_at("L1", "S1", 2, None, at(0)).await.unwrap();
        svc.add_rating_at("L1", "S1", 4, None, at(25)).await.unwrap();

        let agg = svc.aggregate("L1").await.unwrap();
        assert_eq!(agg.count, 2);
        assert_eq!(agg.avg, Some(3.0));
    }

    #[tokio::test]
    async fn test_out_of_range_values_leave_state_unchanged() {
        let repo = Arc::new(LocalRepository::new());
        let svc = ratings(&repo);

        for value in [0, 6, 7, -1, 300] {
            let err = svc.add_rating_at("L1", "S1", value, None, at(0)).await.unwrap_err();
            assert!(err.is_invalid_input(), "value {} accepted", value);
        }
        assert_eq!(repo.rating_count("L1"), 0);
        assert_eq!(svc.aggregate("L1").await.unwrap(), RatingAggregate::empty());
    }

    #[tokio::test]
    async fn test_blank_ids_are_rejected() {
        let repo = Arc::new(LocalRepository::new());
        let svc = ratings(&repo);

        assert!(svc.add_rating("", "S1", 3, None).await.is_err());
        assert!(svc.add_rating("L1", "  ", 3, None).await.is_err());
        assert!(svc.aggregate(" ").await.is_err());
    }

    #[tokio::test]
    async fn test_user_rating_respects_window() {
        let repo = Arc::new(LocalRepository::new());
        let svc = ratings(&repo);
        svc.add_rating_at("L1", "S1", 4, Some("u-1".into()), at(0))
            .await
            .unwrap();

        let found = svc.user_rating_at("L1", "S1", at(23)).await.unwrap().unwrap();
        assert_eq!(found.value, 4);
        assert_eq!(found.user_id.as_deref(), Some("u-1"));
        assert!(svc.user_rating_at("L1", "S1", at(25)).await.unwrap().is_none());
        assert!(svc.user_rating_at("L1", "S2", at(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let repo = Arc::new(LocalRepository::new());
        let svc = ratings(&repo);
        repo.set_healthy(false);

        let err = svc.add_rating("L1", "S1", 3, None).await.unwrap_err();
        assert!(matches!(err, TrackingError::StorageUnavailable(_)));
    }
}
