//! Rating repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::RepositoryResult;
use crate::api::{NewRating, Rating, RatingAggregate, RatingUpsert};

/// Repository trait for star ratings.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Insert or update the rating of `(listing_id, session_id)`.
    ///
    /// If the session already rated the listing at or after `window_start`,
    /// that rating keeps its id and receives the new value, user and `now`
    /// as its timestamp. Otherwise a new rating is inserted. Lookup and write
    /// are serialised per `(listing_id, session_id)`.
    async fn upsert_rating(
        &self,
        rating: NewRating,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<RatingUpsert>;

    /// Most recent rating of the session for the listing created at or after
    /// `window_start`.
    async fn find_recent_rating(
        &self,
        listing_id: &str,
        session_id: &str,
        window_start: DateTime<Utc>,
    ) -> RepositoryResult<Option<Rating>>;

    /// Aggregate over every stored rating of the listing.
    ///
    /// Returns [`RatingAggregate::empty`] for a listing with no ratings.
    async fn fetch_rating_aggregate(&self, listing_id: &str) -> RepositoryResult<RatingAggregate>;
}
