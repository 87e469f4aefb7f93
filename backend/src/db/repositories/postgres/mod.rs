//! Postgres repository implementation using Diesel.
//!
//! This is the shared store for deployments that run more than one process:
//! fingerprints, counters and ratings then stay consistent across instances
//! because every read-modify-write is a database transaction.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 2)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 1)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 50)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::expression::SqlLiteral;
use diesel::sql_types::{BigInt, Date, Text, Timestamptz};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;
use tokio::task;
use uuid::Uuid;

use crate::api::{
    DailyMetric, HitDimension, NewRating, Rating, RatingAggregate, RatingUpsert, TopEntry,
};
use crate::db::repository::{
    ErrorContext, MetricMutator, MetricsRepository, RatingRepository, ReportRepository,
    RepositoryError, RepositoryResult,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

const TOP_HITS_SQL: &str = "\
    SELECT hit_key, SUM(hits)::BIGINT AS total, MAX(last_hit_at) AS last_hit_at \
    FROM hit_counters \
    WHERE dimension = $1 AND hit_date >= $2 \
    GROUP BY hit_key \
    ORDER BY total DESC, last_hit_at DESC, hit_key ASC \
    LIMIT $3";

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 2,
            idle_timeout_sec: 600,
            max_retries: 1,
            retry_delay_ms: 50,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let defaults = Self::default();

        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Conflict value for `hit_counters.last_hit_at`: a late-arriving hit with an
/// older timestamp must not move the column backwards.
fn latest_hit_at() -> SqlLiteral<Timestamptz> {
    diesel::dsl::sql::<Timestamptz>("GREATEST(hit_counters.last_hit_at, excluded.last_hit_at)")
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// Blocks on the network; call from a blocking context.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        log::info!(
            "Postgres repository ready (pool max_size={})",
            config.max_pool_size
        );

        Ok(Self { pool, config })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation on the blocking pool, retrying transient
    /// failures with exponential backoff.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1)),
                        );
                        if attempt < max_retries {
                            log::debug!("Retrying after pool error: {}", err);
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        log::debug!("Retrying after transient failure: {}", e);
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

fn map_diesel_error(operation: &'static str) -> impl Fn(diesel::result::Error) -> RepositoryError {
    move |err| RepositoryError::from(err).with_operation(operation)
}

#[async_trait]
impl MetricsRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error("health_check"))
        })
        .await
    }

    async fn upsert_daily_metric(
        &self,
        entity_id: &str,
        date: NaiveDate,
        mutator: MetricMutator,
    ) -> RepositoryResult<DailyMetric> {
        let entity_id = entity_id.to_string();
        self.with_conn(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                // Make sure the row exists so the lock below always has a target
                diesel::insert_into(daily_metrics::table)
                    .values(&DailyMetricRow::zero(&entity_id, date))
                    .on_conflict((daily_metrics::entity_id, daily_metrics::metric_date))
                    .do_nothing()
                    .execute(conn)?;

                let row: DailyMetricRow = daily_metrics::table
                    .filter(daily_metrics::entity_id.eq(&entity_id))
                    .filter(daily_metrics::metric_date.eq(date))
                    .select(DailyMetricRow::as_select())
                    .for_update()
                    .get_result(conn)?;

                let mut metric = DailyMetric::from(row);
                mutator(&mut metric);

                diesel::update(daily_metrics::table)
                    .filter(daily_metrics::entity_id.eq(&entity_id))
                    .filter(daily_metrics::metric_date.eq(date))
                    .set(&DailyMetricCounts::from(&metric))
                    .execute(conn)?;

                Ok(metric)
            })
            .map_err(map_diesel_error("upsert_daily_metric"))
        })
        .await
    }

    async fn fetch_daily_metrics(
        &self,
        entity_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<DailyMetric>> {
        let entity_id = entity_id.to_string();
        self.with_conn(move |conn| {
            daily_metrics::table
                .filter(daily_metrics::entity_id.eq(&entity_id))
                .filter(daily_metrics::metric_date.between(from, to))
                .order(daily_metrics::metric_date.asc())
                .select(DailyMetricRow::as_select())
                .load::<DailyMetricRow>(conn)
                .map(|rows| rows.into_iter().map(DailyMetric::from).collect())
                .map_err(map_diesel_error("fetch_daily_metrics"))
        })
        .await
    }

    async fn has_fingerprint(&self, key: &str) -> RepositoryResult<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            diesel::select(diesel::dsl::exists(
                metric_fingerprints::table.filter(metric_fingerprints::fingerprint.eq(&key)),
            ))
            .get_result::<bool>(conn)
            .map_err(map_diesel_error("has_fingerprint"))
        })
        .await
    }

    async fn record_fingerprint(&self, key: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            diesel::insert_into(metric_fingerprints::table)
                .values((
                    metric_fingerprints::fingerprint.eq(&key),
                    metric_fingerprints::recorded_at.eq(at),
                ))
                .on_conflict_do_nothing()
                .execute(conn)
                .map(|inserted| inserted == 1)
                .map_err(map_diesel_error("record_fingerprint"))
        })
        .await
    }

    async fn remove_fingerprint(&self, key: &str) -> RepositoryResult<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            diesel::delete(
                metric_fingerprints::table.filter(metric_fingerprints::fingerprint.eq(&key)),
            )
            .execute(conn)
            .map(|deleted| deleted == 1)
            .map_err(map_diesel_error("remove_fingerprint"))
        })
        .await
    }

    async fn purge_fingerprints(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        self.with_conn(move |conn| {
            diesel::delete(
                metric_fingerprints::table.filter(metric_fingerprints::recorded_at.lt(cutoff)),
            )
            .execute(conn)
            .map_err(map_diesel_error("purge_fingerprints"))
        })
        .await
    }
}

#[async_trait]
impl RatingRepository for PostgresRepository {
    async fn upsert_rating(
        &self,
        rating: NewRating,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<RatingUpsert> {
        self.with_conn(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                // Serialise writers of the same (listing, session) until commit
                sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
                    .bind::<Text, _>(format!("{}:{}", rating.listing_id, rating.session_id))
                    .execute(conn)?;

                let existing: Option<RatingRow> = ratings::table
                    .filter(ratings::listing_id.eq(&rating.listing_id))
                    .filter(ratings::session_id.eq(&rating.session_id))
                    .filter(ratings::created_at.ge(window_start))
                    .order(ratings::created_at.desc())
                    .select(RatingRow::as_select())
                    .first(conn)
                    .optional()?;

                match existing {
                    Some(row) => {
                        let user_id = rating.user_id.clone().or(row.user_id);
                        let updated: RatingRow = diesel::update(ratings::table.find(row.id))
                            .set((
                                ratings::value.eq(i16::from(rating.value)),
                                ratings::user_id.eq(user_id),
                                ratings::created_at.eq(now),
                            ))
                            .returning(RatingRow::as_returning())
                            .get_result(conn)?;
                        Ok(RatingUpsert {
                            rating: Rating::from(updated),
                            inserted: false,
                        })
                    }
                    None => {
                        let row = RatingRow {
                            id: Uuid::new_v4().to_string(),
                            listing_id: rating.listing_id.clone(),
                            session_id: rating.session_id.clone(),
                            user_id: rating.user_id.clone(),
                            value: i16::from(rating.value),
                            created_at: now,
                        };
                        let inserted: RatingRow = diesel::insert_into(ratings::table)
                            .values(&row)
                            .returning(RatingRow::as_returning())
                            .get_result(conn)?;
                        Ok(RatingUpsert {
                            rating: Rating::from(inserted),
                            inserted: true,
                        })
                    }
                }
            })
            .map_err(map_diesel_error("upsert_rating"))
        })
        .await
    }

    async fn find_recent_rating(
        &self,
        listing_id: &str,
        session_id: &str,
        window_start: DateTime<Utc>,
    ) -> RepositoryResult<Option<Rating>> {
        let listing_id = listing_id.to_string();
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            ratings::table
                .filter(ratings::listing_id.eq(&listing_id))
                .filter(ratings::session_id.eq(&session_id))
                .filter(ratings::created_at.ge(window_start))
                .order(ratings::created_at.desc())
                .select(RatingRow::as_select())
                .first(conn)
                .optional()
                .map(|row| row.map(Rating::from))
                .map_err(map_diesel_error("find_recent_rating"))
        })
        .await
    }

    async fn fetch_rating_aggregate(&self, listing_id: &str) -> RepositoryResult<RatingAggregate> {
        let listing_id = listing_id.to_string();
        self.with_conn(move |conn| {
            let values: Vec<i16> = ratings::table
                .filter(ratings::listing_id.eq(&listing_id))
                .select(ratings::value)
                .load(conn)
                .map_err(map_diesel_error("fetch_rating_aggregate"))?;

            Ok(RatingAggregate::from_values(
                values.into_iter().filter_map(|v| u8::try_from(v).ok()),
            ))
        })
        .await
    }
}

#[async_trait]
impl ReportRepository for PostgresRepository {
    async fn record_hit(
        &self,
        dimension: HitDimension,
        key: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            diesel::insert_into(hit_counters::table)
                .values((
                    hit_counters::dimension.eq(dimension.as_str()),
                    hit_counters::hit_key.eq(&key),
                    hit_counters::hit_date.eq(at.date_naive()),
                    hit_counters::hits.eq(1_i64),
                    hit_counters::last_hit_at.eq(at),
                ))
                .on_conflict((
                    hit_counters::dimension,
                    hit_counters::hit_key,
                    hit_counters::hit_date,
                ))
                .do_update()
                .set((
                    hit_counters::hits.eq(hit_counters::hits + 1_i64),
                    hit_counters::last_hit_at.eq(latest_hit_at()),
                ))
                .returning(hit_counters::hits)
                .get_result::<i64>(conn)
                .map(to_count)
                .map_err(map_diesel_error("record_hit"))
        })
        .await
    }

    async fn fetch_top_hits(
        &self,
        dimension: HitDimension,
        since: NaiveDate,
        limit: usize,
    ) -> RepositoryResult<Vec<TopEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            sql_query(TOP_HITS_SQL)
                .bind::<Text, _>(dimension.as_str())
                .bind::<Date, _>(since)
                .bind::<BigInt, _>(limit)
                .load::<TopHitRow>(conn)
                .map(|rows| rows.into_iter().map(TopEntry::from).collect())
                .map_err(map_diesel_error("fetch_top_hits"))
        })
        .await
    }
}
