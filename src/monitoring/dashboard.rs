use super::alerts::{AlertEngine, FiredAlert};
use super::collector::MetricsCollector;
use super::health::{HealthAlert, HealthMonitor};
use super::history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
use super::{DatabaseStatus, HealthMetrics, HealthStatus, SystemMetrics};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsOverview {
    /// Cooldown-gated rule alerts triggered within the last hour.
    pub alerts: Vec<FiredAlert>,
    /// Condition alerts from the most recent health check.
    pub health_alerts: Vec<HealthAlert>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSummary {
    pub status: HealthStatus,
    pub uptime: u64,
    pub cpu_usage: f64,
    pub memory_usage_mb: f64,
    pub memory_percentage: f64,
    pub avg_response_time: f64,
    pub error_rate: f64,
    pub database_status: DatabaseStatus,
    pub request_count: u64,
    pub throughput: f64,
    pub total_users: Option<u64>,
    pub total_books: Option<u64>,
    pub total_reviews: Option<u64>,
    pub active_alerts: usize,
    pub last_updated: DateTime<Utc>,
}

/// Cached view; every field is `None` until a health check has run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: Option<HealthStatus>,
    pub uptime: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub cpu_usage: Option<f64>,
    pub memory_usage_mb: Option<f64>,
    pub avg_response_time: Option<f64>,
    pub error_rate: Option<f64>,
    pub database_status: Option<DatabaseStatus>,
    pub throughput: Option<f64>,
}

/// Owns the snapshot histories and serves the monitoring views.
#[derive(Debug)]
pub struct MonitoringDashboard {
    health_monitor: Arc<HealthMonitor>,
    collector: Arc<MetricsCollector>,
    alert_engine: Arc<RwLock<AlertEngine>>,
    metrics_history: RwLock<HistoryBuffer<SystemMetrics>>,
    health_history: RwLock<HistoryBuffer<HealthMetrics>>,
}

impl MonitoringDashboard {
    pub fn new(health_monitor: Arc<HealthMonitor>, collector: Arc<MetricsCollector>) -> Self {
        Self::with_capacity(health_monitor, collector, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(
        health_monitor: Arc<HealthMonitor>,
        collector: Arc<MetricsCollector>,
        capacity: usize,
    ) -> Self {
        let alert_engine = collector.alert_engine();
        Self {
            health_monitor,
            collector,
            alert_engine,
            metrics_history: RwLock::new(HistoryBuffer::new(capacity)),
            health_history: RwLock::new(HistoryBuffer::new(capacity)),
        }
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health_monitor
    }

    pub fn alert_engine(&self) -> &Arc<RwLock<AlertEngine>> {
        &self.alert_engine
    }

    /// Collect a fresh metrics snapshot and append it to the history.
    pub async fn current_metrics(&self) -> Result<SystemMetrics> {
        let metrics = self.collector.collect_metrics().await?;
        self.record_metrics(metrics.clone()).await;
        Ok(metrics)
    }

    /// Run a fresh health check and append it to the history.
    pub async fn current_health(&self) -> Result<HealthMetrics> {
        let health = self.health_monitor.check_health().await?;
        self.record_health(health.clone()).await;
        Ok(health)
    }

    pub async fn record_metrics(&self, metrics: SystemMetrics) {
        self.metrics_history.write().await.push(metrics);
    }

    pub async fn record_health(&self, health: HealthMetrics) {
        self.health_history.write().await.push(health);
    }

    pub async fn metrics_history(&self, limit: usize) -> Vec<SystemMetrics> {
        self.metrics_history.read().await.recent(limit)
    }

    pub async fn health_history(&self, limit: usize) -> Vec<HealthMetrics> {
        self.health_history.read().await.recent(limit)
    }

    pub async fn alerts(&self) -> AlertsOverview {
        let alerts = self.alert_engine.read().await.list_active_alerts();
        let health_alerts = self.health_monitor.get_alerts().await;
        let total = alerts.len() + health_alerts.len();
        AlertsOverview {
            alerts,
            health_alerts,
            total,
        }
    }

    /// Clear both alert sources. Safe to repeat.
    pub async fn clear_alerts(&self) {
        self.alert_engine.write().await.clear_alerts();
        self.health_monitor.clear_alerts().await;
        info!("Cleared all monitoring alerts");
    }

    /// Latest cached snapshots, collecting fresh ones only when a history is empty.
    pub async fn summary(&self) -> Result<MonitoringSummary> {
        let cached_health = self.health_history.read().await.latest().cloned();
        let health = match cached_health {
            Some(health) => health,
            None => self.current_health().await?,
        };

        let cached_metrics = self.metrics_history.read().await.latest().cloned();
        let metrics = match cached_metrics {
            Some(metrics) => metrics,
            None => self.current_metrics().await?,
        };

        let overview = self.alerts().await;

        Ok(MonitoringSummary {
            status: health.status,
            uptime: health.uptime_ms,
            cpu_usage: metrics.cpu.usage,
            memory_usage_mb: health.memory_usage.resident_mb(),
            memory_percentage: metrics.memory.percentage,
            avg_response_time: health.avg_response_time_ms,
            error_rate: health.error_rate_pct,
            database_status: health.database_status,
            request_count: metrics.application.request_count,
            throughput: metrics.application.throughput,
            total_users: metrics.business.total_users,
            total_books: metrics.business.total_books,
            total_reviews: metrics.business.total_reviews,
            active_alerts: overview.total,
            last_updated: health.timestamp.max(metrics.timestamp),
        })
    }

    /// Cached status only; never triggers a collection.
    pub async fn status(&self) -> StatusView {
        let health = self.health_history.read().await.latest().cloned();
        let metrics = self.metrics_history.read().await.latest().cloned();

        let mut view = StatusView::default();
        if let Some(health) = health {
            view.status = Some(health.status);
            view.uptime = Some(health.uptime_ms);
            view.timestamp = Some(health.timestamp);
            view.cpu_usage = Some(health.cpu_usage_pct);
            view.memory_usage_mb = Some(health.memory_usage.resident_mb());
            view.avg_response_time = Some(health.avg_response_time_ms);
            view.error_rate = Some(health.error_rate_pct);
            view.database_status = Some(health.database_status);
        }
        if let Some(metrics) = metrics {
            view.throughput = Some(metrics.application.throughput);
        }
        view
    }

    /// Administrative reset of the request recorder.
    pub fn reset(&self) {
        self.health_monitor.reset();
        info!("Monitoring counters reset");
    }
}
