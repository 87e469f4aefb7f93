//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Tracking payloads are a handful of fields.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // The instrumentation is called from the public site on other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Tracking and reports
        .route("/metrics/track", post(handlers::track_event))
        .route("/metrics/hit", post(handlers::track_hit))
        .route("/metrics/top", get(handlers::get_top))
        .route("/metrics/daily", get(handlers::get_daily_metrics))
        // Ratings
        .route("/ratings", post(handlers::create_rating))
        .route("/ratings/aggregate", get(handlers::get_rating_aggregate))
        .route("/ratings/check", get(handlers::check_rating))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::repositories::LocalRepository;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let state = AppState::new(Arc::new(LocalRepository::new()), AppConfig::default());
        create_router(state)
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ratings_route_accepts_post() {
        let response = router()
            .oneshot(
                Request::post("/ratings")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"listingId":"L1","sessionId":"S1","value":4}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = router()
            .oneshot(Request::get("/metrics/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
