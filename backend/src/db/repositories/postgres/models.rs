use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text, Timestamptz};

use super::schema::{daily_metrics, ratings};
use crate::api::{DailyMetric, Rating, TopEntry};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = daily_metrics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DailyMetricRow {
    pub entity_id: String,
    pub metric_date: NaiveDate,
    pub views: i64,
    pub unique_viewers: i64,
    pub detail_clicks: i64,
    pub favorites: i64,
    pub calendar_adds: i64,
}

impl DailyMetricRow {
    pub fn zero(entity_id: &str, date: NaiveDate) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            metric_date: date,
            views: 0,
            unique_viewers: 0,
            detail_clicks: 0,
            favorites: 0,
            calendar_adds: 0,
        }
    }
}

/// Counter columns only; the key never changes on update.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = daily_metrics)]
pub struct DailyMetricCounts {
    pub views: i64,
    pub unique_viewers: i64,
    pub detail_clicks: i64,
    pub favorites: i64,
    pub calendar_adds: i64,
}

impl From<DailyMetricRow> for DailyMetric {
    fn from(row: DailyMetricRow) -> Self {
        Self {
            entity_id: row.entity_id,
            date: row.metric_date,
            views: to_count(row.views),
            unique_viewers: to_count(row.unique_viewers),
            detail_clicks: to_count(row.detail_clicks),
            favorites: to_count(row.favorites),
            calendar_adds: to_count(row.calendar_adds),
        }
    }
}

impl From<&DailyMetric> for DailyMetricCounts {
    fn from(metric: &DailyMetric) -> Self {
        Self {
            views: to_column(metric.views),
            unique_viewers: to_column(metric.unique_viewers),
            detail_clicks: to_column(metric.detail_clicks),
            favorites: to_column(metric.favorites),
            calendar_adds: to_column(metric.calendar_adds),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ratings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RatingRow {
    pub id: String,
    pub listing_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub value: i16,
    pub created_at: DateTime<Utc>,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Self {
            id: row.id,
            listing_id: row.listing_id,
            session_id: row.session_id,
            user_id: row.user_id,
            // The column carries a CHECK (value BETWEEN 1 AND 5)
            value: u8::try_from(row.value).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

/// Row of the Top-N aggregation query.
#[derive(Debug, Clone, QueryableByName)]
pub struct TopHitRow {
    #[diesel(sql_type = Text)]
    pub hit_key: String,
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = Timestamptz)]
    pub last_hit_at: DateTime<Utc>,
}

impl From<TopHitRow> for TopEntry {
    fn from(row: TopHitRow) -> Self {
        Self {
            key: row.hit_key,
            count: to_count(row.total),
            last_seen: row.last_hit_at,
        }
    }
}

pub fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
