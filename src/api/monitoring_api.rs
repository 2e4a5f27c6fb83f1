use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::monitoring::{
    AlertsOverview, HealthMetrics, MonitoringSummary, StatusView, SystemMetrics,
    DEFAULT_HISTORY_LIMIT,
};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

impl HistoryQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}

/// Collect a fresh metrics snapshot
pub async fn get_metrics(State(state): State<AppState>) -> Result<Json<SystemMetrics>, ApiError> {
    let metrics = state
        .dashboard
        .current_metrics()
        .await
        .map_err(ApiError::Metrics)?;
    Ok(Json(metrics))
}

/// Run a fresh health check
pub async fn get_health(State(state): State<AppState>) -> Result<Json<HealthMetrics>, ApiError> {
    let health = state
        .dashboard
        .current_health()
        .await
        .map_err(ApiError::Health)?;
    Ok(Json(health))
}

pub async fn get_metrics_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<SystemMetrics>> {
    Json(state.dashboard.metrics_history(query.limit()).await)
}

pub async fn get_health_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<HealthMetrics>> {
    Json(state.dashboard.health_history(query.limit()).await)
}

pub async fn get_alerts(State(state): State<AppState>) -> Json<AlertsOverview> {
    Json(state.dashboard.alerts().await)
}

pub async fn clear_alerts(State(state): State<AppState>) -> Json<Value> {
    state.dashboard.clear_alerts().await;
    Json(json!({ "message": "Alerts cleared" }))
}

/// Latest cached snapshots; collects only when nothing has been recorded yet
pub async fn get_summary(
    State(state): State<AppState>,
) -> Result<Json<MonitoringSummary>, ApiError> {
    let summary = state.dashboard.summary().await.map_err(ApiError::Summary)?;
    Ok(Json(summary))
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusView> {
    Json(state.dashboard.status().await)
}

pub async fn reset(State(state): State<AppState>) -> Json<Value> {
    state.dashboard.reset();
    Json(json!({ "message": "Monitoring counters reset" }))
}

/// Prometheus text exposition
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.exporter.gather_metrics(),
    )
}
