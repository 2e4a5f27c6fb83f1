//! End-to-end tests of the monitoring HTTP surface against an in-memory store.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use bookshelf_monitor::{
    api::create_api_router,
    application::DependencyContainer,
    monitoring::{FixedProbe, MockMonitoringRepository},
    Config,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    container: Arc<DependencyContainer>,
    repository: Arc<MockMonitoringRepository>,
}

fn test_app(repository: MockMonitoringRepository, probe: FixedProbe) -> TestApp {
    let mut config = Config::default();
    config.monitoring.cpu_sample_window_ms = 5;
    config.monitoring.probe_timeout_ms = 500;

    let repository = Arc::new(repository);
    let container = Arc::new(
        DependencyContainer::with_components(config, repository.clone(), Arc::new(probe))
            .unwrap(),
    );
    let router = create_api_router(container.api_state(), Duration::from_secs(30));

    TestApp {
        router,
        container,
        repository,
    }
}

fn default_app() -> TestApp {
    test_app(MockMonitoringRepository::default(), FixedProbe::default())
}

async fn send(app: &TestApp, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &TestApp, uri: &str) -> Value {
    let (status, body) = send(app, "GET", uri).await;
    assert_eq!(status, StatusCode::OK, "GET {} failed", uri);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_status_is_null_before_any_check() {
    let app = default_app();
    let status = get_json(&app, "/api/monitoring/status").await;

    assert!(status["status"].is_null());
    assert!(status["uptime"].is_null());
    assert!(status["cpuUsage"].is_null());
    assert!(status["throughput"].is_null());
    assert_eq!(app.repository.ping_count(), 0);
}

#[tokio::test]
async fn test_summary_collects_when_history_is_empty() {
    let app = default_app();
    let summary = get_json(&app, "/api/monitoring/summary").await;

    assert_eq!(summary["status"], "healthy");
    assert_eq!(summary["databaseStatus"], "connected");
    assert_eq!(summary["totalBooks"], 340);
    assert_eq!(summary["totalReviews"], 910);
    assert_eq!(app.repository.ping_count(), 1);

    let history = get_json(&app, "/api/monitoring/health/history").await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let status = get_json(&app, "/api/monitoring/status").await;
    assert_eq!(status["status"], "healthy");
    assert_eq!(status["databaseStatus"], "connected");
}

#[tokio::test]
async fn test_history_respects_limit() {
    let app = default_app();
    for _ in 0..3 {
        get_json(&app, "/api/monitoring/health").await;
    }

    let limited = get_json(&app, "/api/monitoring/health/history?limit=2").await;
    assert_eq!(limited.as_array().unwrap().len(), 2);

    let all = get_json(&app, "/api/monitoring/health/history").await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let metrics = get_json(&app, "/api/monitoring/metrics/history?limit=5").await;
    assert!(metrics.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_history_limit_is_rejected() {
    let app = default_app();
    let (status, _) = send(&app, "GET", "/api/monitoring/health/history?limit=lots").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_snapshot_shape() {
    let app = default_app();
    let metrics = get_json(&app, "/api/monitoring/metrics").await;

    assert_eq!(metrics["cpu"]["usage"], 12.5);
    assert_eq!(metrics["cpu"]["loadAverage"].as_array().unwrap().len(), 3);
    assert_eq!(metrics["memory"]["percentage"], 37.5);
    assert_eq!(metrics["database"]["connectionCount"], 4);
    assert!(metrics["database"]["queryCount"].is_null());
    assert_eq!(metrics["business"]["totalUsers"], 120);
    assert_eq!(metrics["business"]["newReviewsToday"], 11);
    assert!(metrics["application"]["uptime"].is_u64());
}

#[tokio::test]
async fn test_alerts_fire_and_clear_idempotently() {
    let app = test_app(
        MockMonitoringRepository::default(),
        FixedProbe::default().with_cpu(95.0),
    );
    get_json(&app, "/api/monitoring/health").await;
    get_json(&app, "/api/monitoring/metrics").await;

    let overview = get_json(&app, "/api/monitoring/alerts").await;
    let ids: Vec<&str> = overview["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"high_cpu"));
    assert_eq!(overview["healthAlerts"].as_array().unwrap().len(), 1);
    assert_eq!(overview["total"].as_u64().unwrap() as usize, ids.len() + 1);

    for _ in 0..2 {
        let (status, _) = send(&app, "POST", "/api/monitoring/alerts/clear").await;
        assert_eq!(status, StatusCode::OK);
    }

    let overview = get_json(&app, "/api/monitoring/alerts").await;
    assert_eq!(overview["total"], 0);

    // Cleared rules are eligible again on the next collection.
    get_json(&app, "/api/monitoring/metrics").await;
    let overview = get_json(&app, "/api/monitoring/alerts").await;
    assert!(overview["total"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_disconnected_store_degrades_softly() {
    let app = test_app(MockMonitoringRepository::disconnected(), FixedProbe::default());

    let health = get_json(&app, "/api/monitoring/health").await;
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["databaseStatus"], "disconnected");
    assert!(health["databaseResponseTimeMs"].is_null());

    let metrics = get_json(&app, "/api/monitoring/metrics").await;
    assert!(metrics["business"]["totalUsers"].is_null());
    assert!(metrics["database"]["connectionCount"].is_null());
    assert_eq!(metrics["cpu"]["usage"], 12.5);
}

#[tokio::test]
async fn test_requests_are_recorded() {
    let app = default_app();
    send(&app, "GET", "/health").await;
    send(&app, "GET", "/api/monitoring/status").await;
    let (status, _) = send(&app, "GET", "/no/such/route").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let recorder = &app.container.recorder;
    assert_eq!(recorder.request_count(), 3);
    assert_eq!(recorder.error_count(), 1);
    assert_eq!(recorder.active_connections(), 0);
    assert_eq!(recorder.samples().len(), 3);
}

#[tokio::test]
async fn test_reset_zeroes_counters() {
    let app = default_app();
    for _ in 0..4 {
        send(&app, "GET", "/health").await;
    }

    let (status, _) = send(&app, "POST", "/api/monitoring/reset").await;
    assert_eq!(status, StatusCode::OK);

    // Only the reset request itself completes after the reset.
    assert_eq!(app.container.recorder.request_count(), 1);
    assert_eq!(app.container.recorder.error_count(), 0);
}

#[tokio::test]
async fn test_prometheus_exposition() {
    let app = default_app();
    get_json(&app, "/api/monitoring/metrics").await;
    get_json(&app, "/api/monitoring/health").await;

    let (status, body) = send(&app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("bookshelf_cpu_usage_percent 12.5"));
    assert!(text.contains("bookshelf_books 340"));
    assert!(text.contains("bookshelf_health_status 0"));
}

#[tokio::test]
async fn test_dashboard_and_liveness() {
    let app = default_app();

    let (status, body) = send(&app, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("/api/monitoring/metrics/history?limit="));
    // The page refreshes both cached snapshots before reading the summary.
    let health_fetch = html.find("fetchJson('/api/monitoring/health')").unwrap();
    let summary_fetch = html.find("fetchJson('/api/monitoring/summary')").unwrap();
    assert!(health_fetch < summary_fetch);

    let liveness = get_json(&app, "/health").await;
    assert_eq!(liveness["status"], "ok");
}

#[tokio::test]
async fn test_summary_follows_latest_health_check() {
    let app = default_app();
    let first = get_json(&app, "/api/monitoring/health").await;
    assert_eq!(first["status"], "healthy");

    for _ in 0..10 {
        let (status, _) = send(&app, "GET", "/no/such/route").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let latest = get_json(&app, "/api/monitoring/health").await;
    assert_eq!(latest["status"], "unhealthy");

    let summary = get_json(&app, "/api/monitoring/summary").await;
    assert_eq!(summary["status"], "unhealthy");
    assert_eq!(summary["errorRate"], latest["errorRatePct"]);
    assert!(summary["errorRate"].as_f64().unwrap() > 10.0);
}

#[tokio::test]
async fn test_cors_headers_present() {
    let app = default_app();
    let request = Request::builder()
        .uri("/api/monitoring/status")
        .header("origin", "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
