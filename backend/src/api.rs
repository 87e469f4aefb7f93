//! Public API surface for the tracking backend.
//!
//! This file consolidates the domain and DTO types shared by the repository,
//! service and HTTP layers. All types derive Serialize/Deserialize for JSON
//! serialization.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted star rating.
pub const MIN_RATING: u8 = 1;
/// Highest accepted star rating.
pub const MAX_RATING: u8 = 5;

// =============================================================================
// Events and daily metrics
// =============================================================================

/// Client-side interaction recorded against a listing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    View,
    DetailClick,
    Favorite,
    CalendarAdd,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::View,
        EventType::DetailClick,
        EventType::Favorite,
        EventType::CalendarAdd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::DetailClick => "detailClick",
            EventType::Favorite => "favorite",
            EventType::CalendarAdd => "calendarAdd",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {}", s))
    }
}

/// Per-entity counters for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetric {
    pub entity_id: String,
    pub date: NaiveDate,
    pub views: u64,
    pub unique_viewers: u64,
    pub detail_clicks: u64,
    pub favorites: u64,
    pub calendar_adds: u64,
}

impl DailyMetric {
    /// Zero-initialised metric for `(entity_id, date)`.
    pub fn new(entity_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            entity_id: entity_id.into(),
            date,
            views: 0,
            unique_viewers: 0,
            detail_clicks: 0,
            favorites: 0,
            calendar_adds: 0,
        }
    }

    /// Apply one event to the counters.
    ///
    /// `first_seen` is true when the event's fingerprint was not recorded
    /// before. Views always count towards `views`; every other counter,
    /// including `unique_viewers`, only moves for first-seen events.
    pub fn apply(&mut self, event: EventType, first_seen: bool) {
        match event {
            EventType::View => {
                self.views += 1;
                if first_seen {
                    self.unique_viewers += 1;
                }
            }
            EventType::DetailClick if first_seen => self.detail_clicks += 1,
            EventType::Favorite if first_seen => self.favorites += 1,
            EventType::CalendarAdd if first_seen => self.calendar_adds += 1,
            _ => {}
        }
    }
}

/// Result of a tracking call as reported to the client.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Counted.
    Tracked,
    /// Already counted in this aggregation window.
    Deduped,
    /// Metrics collection is switched off by configuration.
    Disabled,
    /// Storage failed; the event was dropped.
    NotTracked,
}

// =============================================================================
// Ratings
// =============================================================================

/// A stored star rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: String,
    pub listing_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub value: u8,
    pub created_at: DateTime<Utc>,
}

/// Input for a rating write. The value has already been range checked.
#[derive(Debug, Clone)]
pub struct NewRating {
    pub listing_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub value: u8,
}

/// Result of a rating upsert.
#[derive(Debug, Clone)]
pub struct RatingUpsert {
    pub rating: Rating,
    /// False when an existing rating inside the window was overwritten.
    pub inserted: bool,
}

/// Histogram of star values, always holding keys 1 through 5.
pub type RatingDistribution = BTreeMap<u8, u64>;

/// Mean, count and histogram for one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingAggregate {
    /// Mean rounded to one decimal place, `None` when there are no ratings.
    pub avg: Option<f64>,
    pub count: u64,
    pub distribution: RatingDistribution,
}

impl RatingAggregate {
    /// Aggregate with no ratings.
    pub fn empty() -> Self {
        Self {
            avg: None,
            count: 0,
            distribution: empty_distribution(),
        }
    }

    /// Recompute the aggregate from the full set of rating values.
    ///
    /// Values outside 1..=5 are ignored; they cannot be stored.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        let mut distribution = empty_distribution();
        let mut sum: u64 = 0;
        let mut count: u64 = 0;

        for value in values {
            if let Some(slot) = distribution.get_mut(&value) {
                *slot += 1;
                sum += u64::from(value);
                count += 1;
            }
        }

        if count == 0 {
            return Self::empty();
        }

        Self {
            avg: Some(round_one_decimal(sum as f64 / count as f64)),
            count,
            distribution,
        }
    }
}

fn empty_distribution() -> RatingDistribution {
    (MIN_RATING..=MAX_RATING).map(|v| (v, 0)).collect()
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// =============================================================================
// Top-N reporting
// =============================================================================

/// Dimension a hit counter belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitDimension {
    Pages,
    Searches,
    Clicks,
}

impl HitDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitDimension::Pages => "pages",
            HitDimension::Searches => "searches",
            HitDimension::Clicks => "clicks",
        }
    }
}

impl fmt::Display for HitDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HitDimension {
    type Err = String;

    /// Accepts both the plural report names and the singular hit kinds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pages" | "page" => Ok(Self::Pages),
            "searches" | "search" => Ok(Self::Searches),
            "clicks" | "click" => Ok(Self::Clicks),
            _ => Err(format!("Unknown metric dimension: {}", s)),
        }
    }
}

/// One row of a Top-N report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopEntry {
    pub key: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_wire_names() {
        for event in EventType::ALL {
            assert_eq!(event.as_str().parse::<EventType>().unwrap(), event);
        }
        assert!("pageView".parse::<EventType>().is_err());
        assert!("View".parse::<EventType>().is_err());
    }

    #[test]
    fn test_apply_view_counts_unique_only_when_first_seen() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut metric = DailyMetric::new("venue-1", date);

        metric.apply(EventType::View, true);
        metric.apply(EventType::View, false);

        assert_eq!(metric.views, 2);
        assert_eq!(metric.unique_viewers, 1);
    }

    #[test]
    fn test_apply_ignores_repeated_non_view_events() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut metric = DailyMetric::new("venue-1", date);

        metric.apply(EventType::Favorite, true);
        metric.apply(EventType::Favorite, false);
        metric.apply(EventType::CalendarAdd, true);

        assert_eq!(metric.favorites, 1);
        assert_eq!(metric.calendar_adds, 1);
        assert_eq!(metric.detail_clicks, 0);
    }

    #[test]
    fn test_aggregate_rounds_to_one_decimal() {
        let agg = RatingAggregate::from_values([5, 4, 4]);
        assert_eq!(agg.avg, Some(4.3));
        assert_eq!(agg.count, 3);
        assert_eq!(agg.distribution[&4], 2);
        assert_eq!(agg.distribution[&5], 1);
        assert_eq!(agg.distribution[&1], 0);
    }

    #[test]
    fn test_empty_aggregate_has_all_buckets() {
        let agg = RatingAggregate::from_values(std::iter::empty());
        assert_eq!(agg, RatingAggregate::empty());
        assert_eq!(agg.distribution.len(), 5);
        assert!(agg.distribution.values().all(|c| *c == 0));
    }

    #[test]
    fn test_aggregate_json_shape() {
        let json = serde_json::to_value(RatingAggregate::from_values([3])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "avg": 3.0,
                "count": 1,
                "distribution": {"1": 0, "2": 0, "3": 1, "4": 0, "5": 0}
            })
        );

        let empty = serde_json::to_value(RatingAggregate::empty()).unwrap();
        assert_eq!(empty["avg"], serde_json::Value::Null);
        assert_eq!(empty["count"], 0);
    }

    #[test]
    fn test_hit_dimension_accepts_singular_and_plural() {
        assert_eq!("pages".parse::<HitDimension>().unwrap(), HitDimension::Pages);
        assert_eq!("search".parse::<HitDimension>().unwrap(), HitDimension::Searches);
        assert_eq!("Clicks".parse::<HitDimension>().unwrap(), HitDimension::Clicks);
        assert!("listings".parse::<HitDimension>().is_err());
    }
}
