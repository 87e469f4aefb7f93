//! End-to-end tests of the HTTP surface against the in-memory store.

#![cfg(feature = "http-server")]

mod support;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use sensory_search::config::AppConfig;
use sensory_search::db::LocalRepository;
use sensory_search::http::{create_router, AppState};

use support::fast_config;

struct TestApp {
    repo: Arc<LocalRepository>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(fast_config())
    }

    fn with_config(config: AppConfig) -> Self {
        let repo = Arc::new(LocalRepository::new());
        let router = create_router(AppState::new(repo.clone(), config));
        Self { repo, router }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn post_json(&self, uri: &str, body: Value, session: Option<&str>) -> Response {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            builder = builder.header("x-session-id", session);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ==================== Health ====================

#[tokio::test]
async fn test_health_reports_store_and_metrics_flag() {
    let app = TestApp::new();
    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["metricsEnabled"], true);
}

#[tokio::test]
async fn test_health_stays_up_when_store_is_down() {
    let app = TestApp::new();
    app.repo.set_healthy(false);

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["database"], "disconnected");
}

// ==================== /metrics/track ====================

#[tokio::test]
async fn test_track_dedupes_repeat_events() {
    let app = TestApp::new();
    let event = json!({"eventId": "venue-1", "type": "favorite"});

    let first = app.post_json("/metrics/track", event.clone(), Some("S1")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await, json!({"ok": true}));

    let second = app.post_json("/metrics/track", event, Some("S1")).await;
    assert_eq!(body_json(second).await, json!({"ok": true, "deduped": true}));

    let other = app
        .post_json(
            "/metrics/track",
            json!({"eventId": "venue-1", "type": "calendarAdd"}),
            Some("S1"),
        )
        .await;
    assert_eq!(body_json(other).await, json!({"ok": true}));
}

#[tokio::test]
async fn test_track_mints_session_cookie_when_missing() {
    let app = TestApp::new();
    let response = app
        .post_json("/metrics/track", json!({"eventId": "venue-1", "type": "view"}), None)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("ss_sid="));

    // Replaying the cookie keeps the same session, so the view is a repeat
    let session = cookie.split(';').next().unwrap().to_string();
    let replay = Request::post("/metrics/track")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, session)
        .body(Body::from(json!({"eventId": "venue-1", "type": "view"}).to_string()))
        .unwrap();
    let response = app.send(replay).await;
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_json(response).await, json!({"ok": true, "deduped": true}));
}

#[tokio::test]
async fn test_track_rejects_bad_input() {
    let app = TestApp::new();

    let unknown = app
        .post_json("/metrics/track", json!({"eventId": "v", "type": "share"}), Some("S1"))
        .await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(unknown).await["code"], "BAD_REQUEST");

    let missing = app
        .post_json("/metrics/track", json!({"type": "view"}), Some("S1"))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let garbage = app
        .send(
            Request::post("/metrics/track")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_track_degrades_when_store_is_down() {
    let app = TestApp::new();
    app.repo.set_healthy(false);

    let response = app
        .post_json("/metrics/track", json!({"eventId": "v", "type": "view"}), Some("S1"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"ok": true, "tracked": false}));
}

#[tokio::test]
async fn test_track_reports_disabled_metrics() {
    let mut config = fast_config();
    config.tracking.metrics_enabled = false;
    let app = TestApp::with_config(config);

    let response = app
        .post_json("/metrics/track", json!({"eventId": "v", "type": "view"}), Some("S1"))
        .await;
    assert_eq!(body_json(response).await, json!({"ok": false, "disabled": true}));
    assert_eq!(app.repo.fingerprint_count(), 0);
}

// ==================== /metrics/hit, /metrics/top, /metrics/daily ====================

#[tokio::test]
async fn test_hits_feed_top_report() {
    let app = TestApp::new();
    for (key, times) in [("/parks", 3), ("/events", 1), ("/venues", 2)] {
        for _ in 0..times {
            let response = app
                .post_json("/metrics/hit", json!({"kind": "page", "key": key}), Some("S1"))
                .await;
            assert_eq!(body_json(response).await, json!({"ok": true}));
        }
    }

    let response = app.get("/metrics/top?type=pages&limit=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["type"], "pages");
    assert_eq!(body["limit"], 2);
    assert_eq!(body["days"], 30);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["key"], "/parks");
    assert_eq!(entries[0]["count"], 3);
    assert_eq!(entries[1]["key"], "/venues");
    assert!(entries[0]["lastSeen"].is_string());
}

#[tokio::test]
async fn test_top_normalises_limit_and_days() {
    let app = TestApp::new();

    let body = body_json(app.get("/metrics/top?type=searches&limit=abc&days=9999").await).await;
    assert_eq!(body["limit"], 10);
    assert_eq!(body["days"], 365);

    let body = body_json(app.get("/metrics/top?type=clicks&limit=0").await).await;
    assert_eq!(body["limit"], 1);
}

#[tokio::test]
async fn test_top_rejects_unknown_type() {
    let app = TestApp::new();
    assert_eq!(
        app.get("/metrics/top?type=listings").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(app.get("/metrics/top").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_hit_rejects_unknown_kind_and_empty_key() {
    let app = TestApp::new();
    let bad_kind = app
        .post_json("/metrics/hit", json!({"kind": "listing", "key": "x"}), None)
        .await;
    assert_eq!(bad_kind.status(), StatusCode::BAD_REQUEST);

    let empty_key = app
        .post_json("/metrics/hit", json!({"kind": "search", "key": "   "}), None)
        .await;
    assert_eq!(empty_key.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_daily_metrics_returns_tracked_counters() {
    let app = TestApp::new();
    for session in ["S1", "S2", "S1"] {
        app.post_json(
            "/metrics/track",
            json!({"eventId": "park-4", "type": "view"}),
            Some(session),
        )
        .await;
    }

    let body = body_json(app.get("/metrics/daily?entityId=park-4").await).await;
    assert_eq!(body["entityId"], "park-4");
    let metrics = body["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["views"], 3);
    assert_eq!(metrics[0]["uniqueViewers"], 2);

    let bad = app
        .get("/metrics/daily?entityId=park-4&from=yesterday")
        .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

// ==================== Ratings ====================

#[tokio::test]
async fn test_rating_then_aggregate() {
    let app = TestApp::new();
    let response = app
        .post_json(
            "/ratings",
            json!({"listingId": "L1", "sessionId": "S1", "value": 3}),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rating = body_json(response).await;
    assert_eq!(rating["listingId"], "L1");
    assert_eq!(rating["value"], 3);
    assert!(rating.get("userId").is_none());

    let body = body_json(app.get("/ratings/aggregate?listingId=L1").await).await;
    assert_eq!(
        body,
        json!({
            "avg": 3.0,
            "count": 1,
            "distribution": {"1": 0, "2": 0, "3": 1, "4": 0, "5": 0}
        })
    );
}

#[tokio::test]
async fn test_aggregate_of_unrated_listing_is_empty_shape() {
    let app = TestApp::new();
    let body = body_json(app.get("/ratings/aggregate?listingId=nobody").await).await;
    assert_eq!(
        body,
        json!({
            "avg": null,
            "count": 0,
            "distribution": {"1": 0, "2": 0, "3": 0, "4": 0, "5": 0}
        })
    );

    assert_eq!(
        app.get("/ratings/aggregate").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_rating_validation_errors_are_400() {
    let app = TestApp::new();
    for body in [
        json!({"listingId": "L1", "sessionId": "S1", "value": 7}),
        json!({"listingId": "L1", "sessionId": "S1", "value": 0}),
        json!({"listingId": "L1", "sessionId": "S1", "value": 2.5}),
        json!({"listingId": "L1", "sessionId": "S1"}),
        json!({"sessionId": "S1", "value": 3}),
        json!({"listingId": "L1", "value": 3}),
    ] {
        let response = app.post_json("/ratings", body.clone(), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
    }
    assert_eq!(app.repo.rating_count("L1"), 0);
}

#[tokio::test]
async fn test_rating_uses_session_header_when_body_has_none() {
    let app = TestApp::new();
    let response = app
        .post_json("/ratings", json!({"listingId": "L2", "value": 4}), Some("S-head"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["sessionId"], "S-head");
}

#[tokio::test]
async fn test_rating_storage_failure_is_503() {
    let app = TestApp::new();
    app.repo.set_healthy(false);

    let response = app
        .post_json(
            "/ratings",
            json!({"listingId": "L1", "sessionId": "S1", "value": 3}),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "STORAGE_UNAVAILABLE");
}

#[tokio::test]
async fn test_check_reports_recent_rating() {
    let app = TestApp::new();
    app.post_json(
        "/ratings",
        json!({"listingId": "L1", "sessionId": "S1", "value": 5}),
        None,
    )
    .await;

    let rated = body_json(app.get("/ratings/check?listingId=L1&sessionId=S1").await).await;
    assert_eq!(rated, json!({"hasRated": true, "value": 5}));

    let other = body_json(app.get("/ratings/check?listingId=L1&sessionId=S2").await).await;
    assert_eq!(other, json!({"hasRated": false}));

    let anonymous = body_json(app.get("/ratings/check?listingId=L1").await).await;
    assert_eq!(anonymous, json!({"hasRated": false}));
}

#[tokio::test]
async fn test_repeat_rating_updates_value_not_count() {
    let app = TestApp::new();
    for value in [2, 4] {
        let response = app
            .post_json(
                "/ratings",
                json!({"listingId": "L5", "sessionId": "S1", "value": value}),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let body = body_json(app.get("/ratings/aggregate?listingId=L5").await).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["avg"], 4.0);
}
