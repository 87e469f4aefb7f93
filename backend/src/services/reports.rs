//! Top-N reports over page, search and click hit counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use super::{bounded, TrackingError, TrackingResult};
use crate::api::{HitDimension, TopEntry, TrackOutcome};
use crate::db::repository::{FullRepository, ReportRepository};

pub const DEFAULT_TOP_LIMIT: usize = 10;
pub const MAX_TOP_LIMIT: usize = 100;
pub const MAX_TOP_DAYS: u32 = 365;
/// Longest accepted hit key, in bytes.
pub const MAX_KEY_BYTES: usize = 512;

/// Parse a `limit` query value: default when absent or not a number,
/// otherwise clamped to `1..=100`.
pub fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(clamp_limit)
        .unwrap_or(DEFAULT_TOP_LIMIT)
}

fn clamp_limit(limit: i64) -> usize {
    usize::try_from(limit.clamp(1, MAX_TOP_LIMIT as i64)).unwrap_or(DEFAULT_TOP_LIMIT)
}

/// Parse a `days` query value: default when absent or not a number,
/// otherwise clamped to `1..=365`.
pub fn clamp_days(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(|d| d.clamp(1, i64::from(MAX_TOP_DAYS)) as u32)
        .unwrap_or_else(|| default.clamp(1, MAX_TOP_DAYS))
}

/// Trim and normalise a hit key for its dimension.
pub fn normalize_key(dimension: HitDimension, key: &str) -> TrackingResult<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(TrackingError::invalid("key is required"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(TrackingError::invalid(format!(
            "key must be at most {} bytes",
            MAX_KEY_BYTES
        )));
    }
    Ok(match dimension {
        HitDimension::Searches => key.to_lowercase(),
        HitDimension::Pages | HitDimension::Clicks => key.to_string(),
    })
}

/// Records hits and ranks them.
#[derive(Clone)]
pub struct TopReporter {
    repository: Arc<dyn FullRepository>,
    timeout: Duration,
    enabled: bool,
    default_days: u32,
}

impl TopReporter {
    pub fn new(
        repository: Arc<dyn FullRepository>,
        timeout: Duration,
        enabled: bool,
        default_days: u32,
    ) -> Self {
        Self {
            repository,
            timeout,
            enabled,
            default_days: default_days.clamp(1, MAX_TOP_DAYS),
        }
    }

    pub fn default_days(&self) -> u32 {
        self.default_days
    }

    /// Count one hit for `key` at `at`. Returns the key's count for that day.
    pub async fn record_hit(
        &self,
        dimension: HitDimension,
        key: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<u64> {
        if !self.enabled {
            return Err(TrackingError::Disabled);
        }
        let key = normalize_key(dimension, key)?;
        bounded(
            self.timeout,
            "record_hit",
            self.repository.record_hit(dimension, &key, at),
        )
        .await
    }

    /// Record a hit now, degrading storage failures to
    /// [`TrackOutcome::NotTracked`].
    pub async fn track_hit(&self, dimension: HitDimension, key: &str) -> TrackingResult<TrackOutcome> {
        match self.record_hit(dimension, key, Utc::now()).await {
            Ok(_) => Ok(TrackOutcome::Tracked),
            Err(TrackingError::Disabled) => Ok(TrackOutcome::Disabled),
            Err(e @ TrackingError::InvalidInput(_)) => Err(e),
            Err(e) => {
                log::warn!("Failed to record {} hit for {}: {}", dimension, key.trim(), e);
                Ok(TrackOutcome::NotTracked)
            }
        }
    }

    /// Top `limit` keys of a dimension over the last `days` days.
    pub async fn top(
        &self,
        dimension: HitDimension,
        limit: usize,
        days: u32,
    ) -> TrackingResult<Vec<TopEntry>> {
        self.top_as_of(dimension, limit, days, Utc::now().date_naive())
            .await
    }

    /// [`TopReporter::top`] with the window ending on `today` inclusive.
    pub async fn top_as_of(
        &self,
        dimension: HitDimension,
        limit: usize,
        days: u32,
        today: NaiveDate,
    ) -> TrackingResult<Vec<TopEntry>> {
        let limit = limit.clamp(1, MAX_TOP_LIMIT);
        let days = days.clamp(1, MAX_TOP_DAYS);
        let since = today - chrono::Duration::days(i64::from(days) - 1);

        bounded(
            self.timeout,
            "fetch_top_hits",
            self.repository.fetch_top_hits(dimension, since, limit),
        )
        .await
    }

    pub async fn top_pages(&self, limit: usize) -> TrackingResult<Vec<TopEntry>> {
        self.top(HitDimension::Pages, limit, self.default_days).await
    }

    pub async fn top_searches(&self, limit: usize) -> TrackingResult<Vec<TopEntry>> {
        self.top(HitDimension::Searches, limit, self.default_days).await
    }

    pub async fn top_clicks(&self, limit: usize) -> TrackingResult<Vec<TopEntry>> {
        self.top(HitDimension::Clicks, limit, self.default_days).await
    }
}
