//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! tracking services for the rules.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};

use super::dto::{
    AggregateQuery, CheckQuery, CheckResponse, DailyQuery, DailyResponse, HealthResponse,
    HitRequest, Rating, RatingAggregate, RatingRequest, TopQuery, TopResponse, TrackRequest,
    TrackResponse,
};
use super::error::AppError;
use super::session::{existing_session, Session};
use super::state::AppState;
use crate::api::HitDimension;
use crate::db::repository::MetricsRepository;
use crate::services::reports::{clamp_days, parse_limit};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Tracking responses may carry a `Set-Cookie` for a freshly minted session.
pub type TrackResult = Result<(HeaderMap, Json<TrackResponse>), AppError>;

/// Days covered by `/metrics/daily` when `from` is omitted.
const DEFAULT_DAILY_SPAN_DAYS: i64 = 30;

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!("{} must be a date in YYYY-MM-DD form", field))
    })
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and the store is reachable.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let timeout = state.tracking.config().storage_timeout();
    let db_status = match tokio::time::timeout(timeout, state.repository.health_check()).await {
        Ok(Ok(true)) => "connected".to_string(),
        Ok(Ok(false)) => "disconnected".to_string(),
        Ok(Err(e)) => format!("error: {}", e),
        Err(_) => "timeout".to_string(),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        metrics_enabled: state.tracking.metrics_enabled(),
    }))
}

// =============================================================================
// Metrics
// =============================================================================

/// POST /metrics/track
///
/// Count one listing event for the caller's session.
pub async fn track_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TrackRequest>, JsonRejection>,
) -> TrackResult {
    let Json(request) = body?;
    let event_id = required(request.event_id, "eventId")?;
    let event_type = required(request.event_type, "type")?;

    let session = Session::resolve(&headers, state.cookie_name());
    let outcome = state
        .tracking
        .metrics
        .track(&event_id, &event_type, &session.id)
        .await?;

    Ok((
        session.response_headers(state.cookie_name()),
        Json(outcome.into()),
    ))
}

/// POST /metrics/hit
///
/// Count a page view, search query or click target for the Top-N reports.
pub async fn track_hit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<HitRequest>, JsonRejection>,
) -> TrackResult {
    let Json(request) = body?;
    let kind = required(request.kind, "kind")?;
    let dimension: HitDimension = kind.parse().map_err(AppError::BadRequest)?;
    let key = required(request.key, "key")?;

    let session = Session::resolve(&headers, state.cookie_name());
    let outcome = state.tracking.reports.track_hit(dimension, &key).await?;

    Ok((
        session.response_headers(state.cookie_name()),
        Json(outcome.into()),
    ))
}

/// GET /metrics/top?type=pages|searches|clicks&limit=N&days=D
pub async fn get_top(
    State(state): State<AppState>,
    query: Result<Query<TopQuery>, QueryRejection>,
) -> HandlerResult<TopResponse> {
    let Query(query) = query?;
    let kind = required(query.kind, "type")?;
    let dimension: HitDimension = kind.parse().map_err(AppError::BadRequest)?;

    let reports = &state.tracking.reports;
    let limit = parse_limit(query.limit.as_deref());
    let days = clamp_days(query.days.as_deref(), reports.default_days());
    let entries = reports.top(dimension, limit, days).await?;

    Ok(Json(TopResponse {
        kind: dimension.to_string(),
        limit,
        days,
        entries,
    }))
}

/// GET /metrics/daily?entityId=&from=&to=
pub async fn get_daily_metrics(
    State(state): State<AppState>,
    query: Result<Query<DailyQuery>, QueryRejection>,
) -> HandlerResult<DailyResponse> {
    let Query(query) = query?;
    let entity_id = required(query.entity_id, "entityId")?;
    let to = match query.to.as_deref() {
        Some(raw) => parse_date(raw, "to")?,
        None => Utc::now().date_naive(),
    };
    let from = match query.from.as_deref() {
        Some(raw) => parse_date(raw, "from")?,
        None => to - chrono::Duration::days(DEFAULT_DAILY_SPAN_DAYS - 1),
    };

    let metrics = state
        .tracking
        .metrics
        .daily_metrics(&entity_id, from, to)
        .await?;

    Ok(Json(DailyResponse { entity_id, metrics }))
}

// =============================================================================
// Ratings
// =============================================================================

/// POST /ratings
///
/// Store the session's rating for a listing, replacing one from the last 24 hours.
pub async fn create_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RatingRequest>, JsonRejection>,
) -> HandlerResult<Rating> {
    let Json(request) = body?;
    let listing_id = required(request.listing_id, "listingId")?;
    let value = request
        .value
        .ok_or_else(|| AppError::BadRequest("value is required".to_string()))?;
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(AppError::BadRequest(
            "value must be a whole number of stars".to_string(),
        ));
    }
    let session_id = match required(request.session_id, "sessionId") {
        Ok(id) => id,
        Err(e) => existing_session(&headers, state.cookie_name()).ok_or(e)?,
    };

    let rating = state
        .tracking
        .ratings
        .add_rating(&listing_id, &session_id, value as i64, request.user_id)
        .await?;

    Ok(Json(rating))
}

/// GET /ratings/aggregate?listingId=
pub async fn get_rating_aggregate(
    State(state): State<AppState>,
    query: Result<Query<AggregateQuery>, QueryRejection>,
) -> HandlerResult<RatingAggregate> {
    let Query(query) = query?;
    let listing_id = required(query.listing_id, "listingId")?;
    let aggregate = state.tracking.ratings.aggregate(&listing_id).await?;
    Ok(Json(aggregate))
}

/// GET /ratings/check?listingId=&sessionId=
///
/// Whether the session rated the listing in the last 24 hours.
pub async fn check_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CheckQuery>, QueryRejection>,
) -> HandlerResult<CheckResponse> {
    let Query(query) = query?;
    let listing_id = required(query.listing_id, "listingId")?;
    let session_id = query
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| existing_session(&headers, state.cookie_name()));

    // A caller without any session cannot have rated
    let Some(session_id) = session_id else {
        return Ok(Json(CheckResponse {
            has_rated: false,
            value: None,
        }));
    };

    let rating = state
        .tracking
        .ratings
        .user_rating(&listing_id, &session_id)
        .await?;

    Ok(Json(CheckResponse {
        has_rated: rating.is_some(),
        value: rating.map(|r| r.value),
    }))
}
