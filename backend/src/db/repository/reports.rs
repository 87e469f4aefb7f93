//! Report repository trait for the Top-N hit counters.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::error::RepositoryResult;
use crate::api::{HitDimension, TopEntry};

/// Repository trait for page, search and click counters.
///
/// Counters are bucketed per UTC day so reports can look back over a window.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Increment the counter of `key` for the day of `at`.
    ///
    /// # Returns
    /// * `Ok(u64)` - The day's count after the increment
    async fn record_hit(
        &self,
        dimension: HitDimension,
        key: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<u64>;

    /// Highest counters of a dimension summed over days on or after `since`.
    ///
    /// Ordered by count descending, then most recent hit first, then key
    /// ascending. At most `limit` entries.
    async fn fetch_top_hits(
        &self,
        dimension: HitDimension,
        since: NaiveDate,
        limit: usize,
    ) -> RepositoryResult<Vec<TopEntry>>;
}
