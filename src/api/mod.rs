pub mod monitoring_api;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::MonitoringError;
use crate::monitoring::{MetricsExporter, MonitoringDashboard, RequestRecorder};

/// Application state for the web API
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<MonitoringDashboard>,
    pub recorder: Arc<RequestRecorder>,
    pub exporter: Arc<MetricsExporter>,
}

/// Endpoint failures. The client only sees a generic message; the cause is logged.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to collect metrics: {0}")]
    Metrics(#[source] MonitoringError),

    #[error("Failed to check health: {0}")]
    Health(#[source] MonitoringError),

    #[error("Failed to build monitoring summary: {0}")]
    Summary(#[source] MonitoringError),
}

impl ApiError {
    fn public_message(&self) -> &'static str {
        match self {
            ApiError::Metrics(_) => "Failed to collect metrics",
            ApiError::Health(_) => "Failed to check health",
            ApiError::Summary(_) => "Failed to build monitoring summary",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(detail = %self, "Monitoring endpoint failed");
        let body = Json(json!({ "error": self.public_message() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Create the main API router
pub fn create_api_router(state: AppState, request_timeout: Duration) -> Router {
    let recorder = state.recorder.clone();

    Router::new()
        // Liveness endpoint
        .route("/health", get(health_check))
        // Monitoring API routes
        .route("/api/monitoring/metrics", get(monitoring_api::get_metrics))
        .route("/api/monitoring/health", get(monitoring_api::get_health))
        .route(
            "/api/monitoring/metrics/history",
            get(monitoring_api::get_metrics_history),
        )
        .route(
            "/api/monitoring/health/history",
            get(monitoring_api::get_health_history),
        )
        .route("/api/monitoring/alerts", get(monitoring_api::get_alerts))
        .route(
            "/api/monitoring/alerts/clear",
            post(monitoring_api::clear_alerts),
        )
        .route("/api/monitoring/summary", get(monitoring_api::get_summary))
        .route("/api/monitoring/status", get(monitoring_api::get_status))
        .route("/api/monitoring/reset", post(monitoring_api::reset))
        // Prometheus scrape endpoint
        .route("/metrics", get(monitoring_api::prometheus_metrics))
        .route("/", get(serve_dashboard))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(recorder, track_requests))
                // Timed out requests surface as 408 and are counted as errors.
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
}

/// Feeds every request's latency and outcome into the recorder.
async fn track_requests(
    State(recorder): State<Arc<RequestRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    let timer = recorder.start_request();
    let response = next.run(request).await;
    timer.finish(response.status().as_u16() >= 400);
    response
}

/// Liveness endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "bookshelf-monitor",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Serve the monitoring dashboard HTML
async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("../../static/dashboard.html"))
}
