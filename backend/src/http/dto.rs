//! Data Transfer Objects for the HTTP API.
//!
//! Request fields are optional at the serde level so that a missing field is
//! reported as a 400 with the field name rather than a generic body error.
//! Domain types that already serialize in wire shape are re-exported.

use serde::{Deserialize, Serialize};

pub use crate::api::{DailyMetric, Rating, RatingAggregate, RatingDistribution, TopEntry};
use crate::api::TrackOutcome;

// =============================================================================
// Tracking
// =============================================================================

/// Body of `POST /metrics/track`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    /// Listing the event belongs to
    pub event_id: Option<String>,
    /// One of `view`, `detailClick`, `favorite`, `calendarAdd`
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

/// Body of `POST /metrics/hit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitRequest {
    /// `page`, `search` or `click`
    pub kind: Option<String>,
    /// Page path, search query or click target
    pub key: Option<String>,
}

/// Envelope returned by the tracking endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked: Option<bool>,
}

impl From<TrackOutcome> for TrackResponse {
    fn from(outcome: TrackOutcome) -> Self {
        let base = Self {
            ok: true,
            deduped: None,
            disabled: None,
            tracked: None,
        };
        match outcome {
            TrackOutcome::Tracked => base,
            TrackOutcome::Deduped => Self {
                deduped: Some(true),
                ..base
            },
            TrackOutcome::Disabled => Self {
                ok: false,
                disabled: Some(true),
                ..base
            },
            TrackOutcome::NotTracked => Self {
                tracked: Some(false),
                ..base
            },
        }
    }
}

/// Query of `GET /metrics/top`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Kept as text: a non-numeric limit falls back to the default
    pub limit: Option<String>,
    pub days: Option<String>,
}

/// Response of `GET /metrics/top`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub limit: usize,
    pub days: u32,
    pub entries: Vec<TopEntry>,
}

/// Query of `GET /metrics/daily`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyQuery {
    pub entity_id: Option<String>,
    /// `YYYY-MM-DD`, defaults to 29 days before `to`
    pub from: Option<String>,
    /// `YYYY-MM-DD`, defaults to today
    pub to: Option<String>,
}

/// Response of `GET /metrics/daily`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyResponse {
    pub entity_id: String,
    pub metrics: Vec<DailyMetric>,
}

// =============================================================================
// Ratings
// =============================================================================

/// Body of `POST /ratings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    pub listing_id: Option<String>,
    /// Whole number of stars; fractional values are rejected
    pub value: Option<f64>,
    /// Falls back to the request's session cookie or header
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// Query of `GET /ratings/aggregate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateQuery {
    pub listing_id: Option<String>,
}

/// Query of `GET /ratings/check`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub listing_id: Option<String>,
    pub session_id: Option<String>,
}

/// Response of `GET /ratings/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub has_rated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u8>,
}

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub metrics_enabled: bool,
}
