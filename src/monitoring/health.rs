use super::exporter::MetricsExporter;
use super::probe::ResourceProbe;
use super::recorder::{RecorderMetrics, RequestRecorder};
use super::repository::MonitoringRepository;
use super::{AlertSeverity, DatabaseStatus, HealthMetrics, HealthStatus, MemoryUsage};
use crate::error::{MonitoringError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub const DEFAULT_CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthThresholds {
    /// Resident memory in megabytes; twice this is unhealthy.
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub response_time_ms: f64,
    /// Error percentage; twice this is unhealthy.
    pub error_rate_percent: f64,
    /// Liveness query latency above which the database counts as slow.
    pub database_response_time_ms: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            memory_mb: 500.0,
            cpu_percent: 80.0,
            response_time_ms: 2000.0,
            error_rate_percent: 5.0,
            database_response_time_ms: 1000.0,
        }
    }
}

/// Probe timings shared by the health monitor and the metrics collector.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub cpu_sample_window: Duration,
    /// Upper bound for every collaborator call; a timeout counts as a failure.
    pub probe_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            cpu_sample_window: DEFAULT_CPU_SAMPLE_WINDOW,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// The fields health classification depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub avg_response_time_ms: f64,
    pub error_rate_percent: f64,
    pub database_status: DatabaseStatus,
}

/// Classify health; the first matching level wins, most severe first.
pub fn derive_status(inputs: &HealthInputs, thresholds: &HealthThresholds) -> HealthStatus {
    if inputs.database_status == DatabaseStatus::Disconnected
        || inputs.error_rate_percent > thresholds.error_rate_percent * 2.0
        || inputs.memory_mb > thresholds.memory_mb * 2.0
    {
        return HealthStatus::Unhealthy;
    }

    if inputs.memory_mb > thresholds.memory_mb
        || inputs.cpu_percent > thresholds.cpu_percent
        || inputs.avg_response_time_ms > thresholds.response_time_ms
        || inputs.error_rate_percent > thresholds.error_rate_percent
        || inputs.database_status == DatabaseStatus::Slow
    {
        return HealthStatus::Degraded;
    }

    HealthStatus::Healthy
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthAlert {
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Direct condition-to-message mapping, recomputed on every check.
pub fn health_alerts(
    inputs: &HealthInputs,
    thresholds: &HealthThresholds,
    timestamp: DateTime<Utc>,
) -> Vec<HealthAlert> {
    let mut alerts = Vec::new();
    let mut push = |severity, message: String| {
        alerts.push(HealthAlert {
            severity,
            message,
            timestamp,
        })
    };

    match inputs.database_status {
        DatabaseStatus::Disconnected => {
            push(AlertSeverity::Critical, "Database connection lost".to_string())
        }
        DatabaseStatus::Slow => push(
            AlertSeverity::Medium,
            format!(
                "Slow database response (threshold: {:.0}ms)",
                thresholds.database_response_time_ms
            ),
        ),
        DatabaseStatus::Connected => {}
    }

    if inputs.memory_mb > thresholds.memory_mb * 2.0 {
        push(
            AlertSeverity::Critical,
            format!("Critical memory usage: {:.1}MB", inputs.memory_mb),
        );
    } else if inputs.memory_mb > thresholds.memory_mb {
        push(
            AlertSeverity::High,
            format!("High memory usage: {:.1}MB", inputs.memory_mb),
        );
    }

    if inputs.cpu_percent > thresholds.cpu_percent {
        push(
            AlertSeverity::High,
            format!("High CPU usage: {:.1}%", inputs.cpu_percent),
        );
    }

    if inputs.avg_response_time_ms > thresholds.response_time_ms {
        push(
            AlertSeverity::Medium,
            format!("Slow response time: {:.0}ms", inputs.avg_response_time_ms),
        );
    }

    if inputs.error_rate_percent > thresholds.error_rate_percent * 2.0 {
        push(
            AlertSeverity::Critical,
            format!("Critical error rate: {:.1}%", inputs.error_rate_percent),
        );
    } else if inputs.error_rate_percent > thresholds.error_rate_percent {
        push(
            AlertSeverity::High,
            format!("High error rate: {:.1}%", inputs.error_rate_percent),
        );
    }

    alerts
}

/// Outcome of the timed liveness query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatabaseProbe {
    pub status: DatabaseStatus,
    pub latency_ms: Option<u64>,
}

/// Classifies overall health from live probes and the request recorder.
#[derive(Debug)]
pub struct HealthMonitor {
    recorder: Arc<RequestRecorder>,
    repository: Arc<dyn MonitoringRepository>,
    probe: Arc<dyn ResourceProbe>,
    thresholds: HealthThresholds,
    settings: ProbeSettings,
    alerts: RwLock<Vec<HealthAlert>>,
    exporter: Option<Arc<MetricsExporter>>,
}

impl HealthMonitor {
    pub fn new(
        recorder: Arc<RequestRecorder>,
        repository: Arc<dyn MonitoringRepository>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self {
            recorder,
            repository,
            probe,
            thresholds: HealthThresholds::default(),
            settings: ProbeSettings::default(),
            alerts: RwLock::new(Vec::new()),
            exporter: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_settings(mut self, settings: ProbeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<MetricsExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Probe every resource and classify overall health. Replaces the alert list.
    ///
    /// Currently always `Ok`: unreadable resources and store failures degrade to
    /// zeroed readings or `disconnected`. Callers still map `Err` to an endpoint error.
    pub async fn check_health(&self) -> Result<HealthMetrics> {
        let started = Instant::now();

        let (cpu_usage, database) = tokio::join!(self.sample_cpu(), self.probe_database());

        let memory_usage = self.probe.process_memory().unwrap_or_else(|e| {
            warn!("Process memory probe failed: {}", e);
            MemoryUsage::default()
        });
        let recorded = self.recorder.metrics();

        let inputs = HealthInputs {
            memory_mb: memory_usage.resident_mb(),
            cpu_percent: cpu_usage,
            avg_response_time_ms: recorded.avg_response_time,
            error_rate_percent: recorded.error_rate,
            database_status: database.status,
        };

        let timestamp = Utc::now();
        let status = derive_status(&inputs, &self.thresholds);
        let alerts = health_alerts(&inputs, &self.thresholds, timestamp);

        match status {
            HealthStatus::Unhealthy => error!("System unhealthy: {} alert(s)", alerts.len()),
            HealthStatus::Degraded => warn!("System degraded: {} alert(s)", alerts.len()),
            HealthStatus::Healthy => debug!("System healthy"),
        }

        *self.alerts.write().await = alerts;

        let health = HealthMetrics {
            timestamp,
            status,
            uptime_ms: recorded.uptime_ms,
            memory_usage,
            cpu_usage_pct: cpu_usage,
            database_status: database.status,
            database_response_time_ms: database.latency_ms,
            avg_response_time_ms: recorded.avg_response_time,
            error_rate_pct: recorded.error_rate,
            active_connections: recorded.active_connections,
            request_count: recorded.request_count,
        };

        if let Some(exporter) = &self.exporter {
            exporter.observe_health(&health);
        }

        debug!(
            "Health check completed in {}ms",
            started.elapsed().as_millis()
        );

        Ok(health)
    }

    /// Time a liveness query. Errors and timeouts both mean disconnected.
    pub async fn probe_database(&self) -> DatabaseProbe {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.settings.probe_timeout, self.repository.ping()).await;

        match outcome {
            Ok(Ok(())) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status = if latency_ms as f64 > self.thresholds.database_response_time_ms {
                    warn!("Database response time degraded: {}ms", latency_ms);
                    DatabaseStatus::Slow
                } else {
                    DatabaseStatus::Connected
                };
                DatabaseProbe {
                    status,
                    latency_ms: Some(latency_ms),
                }
            }
            Ok(Err(e)) => {
                error!("Database health check failed: {}", e);
                DatabaseProbe {
                    status: DatabaseStatus::Disconnected,
                    latency_ms: None,
                }
            }
            Err(_) => {
                let timeout = MonitoringError::Timeout {
                    operation: "database health check".to_string(),
                    timeout_ms: self.settings.probe_timeout.as_millis() as u64,
                };
                error!("{}", timeout);
                DatabaseProbe {
                    status: DatabaseStatus::Disconnected,
                    latency_ms: None,
                }
            }
        }
    }

    async fn sample_cpu(&self) -> f64 {
        match self.probe.sample_cpu(self.settings.cpu_sample_window).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("CPU sampling failed: {}", e);
                0.0
            }
        }
    }

    pub async fn get_alerts(&self) -> Vec<HealthAlert> {
        self.alerts.read().await.clone()
    }

    pub async fn clear_alerts(&self) {
        self.alerts.write().await.clear();
    }

    pub fn get_metrics(&self) -> RecorderMetrics {
        self.recorder.metrics()
    }

    pub fn reset(&self) {
        self.recorder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::probe::FixedProbe;
    use crate::monitoring::repository::MockMonitoringRepository;

    fn inputs() -> HealthInputs {
        HealthInputs {
            memory_mb: 100.0,
            cpu_percent: 10.0,
            avg_response_time_ms: 50.0,
            error_rate_percent: 0.0,
            database_status: DatabaseStatus::Connected,
        }
    }

    fn monitor(repository: MockMonitoringRepository, probe: FixedProbe) -> HealthMonitor {
        HealthMonitor::new(
            Arc::new(RequestRecorder::default()),
            Arc::new(repository),
            Arc::new(probe),
        )
    }

    #[test]
    fn test_health_thresholds_default() {
        let thresholds = HealthThresholds::default();
        assert_eq!(thresholds.memory_mb, 500.0);
        assert_eq!(thresholds.cpu_percent, 80.0);
        assert_eq!(thresholds.response_time_ms, 2000.0);
        assert_eq!(thresholds.error_rate_percent, 5.0);
        assert_eq!(thresholds.database_response_time_ms, 1000.0);
    }

    #[test]
    fn test_derive_status_levels() {
        let thresholds = HealthThresholds::default();
        assert_eq!(derive_status(&inputs(), &thresholds), HealthStatus::Healthy);

        let degraded = HealthInputs {
            cpu_percent: 85.0,
            ..inputs()
        };
        assert_eq!(derive_status(&degraded, &thresholds), HealthStatus::Degraded);

        let slow_db = HealthInputs {
            database_status: DatabaseStatus::Slow,
            ..inputs()
        };
        assert_eq!(derive_status(&slow_db, &thresholds), HealthStatus::Degraded);

        let heavy = HealthInputs {
            memory_mb: 1001.0,
            ..inputs()
        };
        assert_eq!(derive_status(&heavy, &thresholds), HealthStatus::Unhealthy);

        let offline = HealthInputs {
            database_status: DatabaseStatus::Disconnected,
            ..inputs()
        };
        assert_eq!(derive_status(&offline, &thresholds), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_error_rate_escalation_is_monotonic() {
        let thresholds = HealthThresholds::default();
        let mut previous = HealthStatus::Healthy;

        for step in 0..=40 {
            let rate = step as f64 * 0.5;
            let status = derive_status(
                &HealthInputs {
                    error_rate_percent: rate,
                    ..inputs()
                },
                &thresholds,
            );
            assert!(status >= previous, "status fell back at {rate}%");
            previous = status;
        }

        let at_seven = HealthInputs {
            error_rate_percent: 7.0,
            ..inputs()
        };
        let at_eleven = HealthInputs {
            error_rate_percent: 11.0,
            ..inputs()
        };
        assert_eq!(derive_status(&at_seven, &thresholds), HealthStatus::Degraded);
        assert_eq!(derive_status(&at_eleven, &thresholds), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_alert_messages() {
        let thresholds = HealthThresholds::default();
        assert!(health_alerts(&inputs(), &thresholds, Utc::now()).is_empty());

        let troubled = HealthInputs {
            memory_mb: 600.0,
            cpu_percent: 90.0,
            avg_response_time_ms: 2500.0,
            error_rate_percent: 12.0,
            database_status: DatabaseStatus::Disconnected,
        };
        let alerts = health_alerts(&troubled, &thresholds, Utc::now());
        let messages: Vec<&str> = alerts.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Database connection lost",
                "High memory usage: 600.0MB",
                "High CPU usage: 90.0%",
                "Slow response time: 2500ms",
                "Critical error rate: 12.0%",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_check() {
        let monitor = monitor(MockMonitoringRepository::default(), FixedProbe::default());
        let health = monitor.check_health().await.unwrap();

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.database_status, DatabaseStatus::Connected);
        assert_eq!(health.cpu_usage_pct, 12.5);
        assert!(monitor.get_alerts().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_resources_still_produce_snapshot() {
        let monitor = monitor(
            MockMonitoringRepository::disconnected(),
            FixedProbe::default().with_process_unavailable(),
        );
        let health = monitor.check_health().await.unwrap();

        assert_eq!(health.cpu_usage_pct, 0.0);
        assert_eq!(health.memory_usage, MemoryUsage::default());
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(monitor.get_alerts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_database_is_unhealthy() {
        let monitor = monitor(MockMonitoringRepository::disconnected(), FixedProbe::default());
        let health = monitor.check_health().await.unwrap();

        assert_eq!(health.database_status, DatabaseStatus::Disconnected);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.database_response_time_ms, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_database_is_degraded() {
        let repository =
            MockMonitoringRepository::default().with_ping_delay(Duration::from_millis(1500));
        let monitor = monitor(repository, FixedProbe::default());
        let health = monitor.check_health().await.unwrap();

        assert_eq!(health.database_status, DatabaseStatus::Slow);
        assert!(health.status >= HealthStatus::Degraded);
        assert_eq!(health.database_response_time_ms, Some(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_counts_as_disconnected() {
        let repository =
            MockMonitoringRepository::default().with_ping_delay(Duration::from_secs(60));
        let monitor = monitor(repository, FixedProbe::default()).with_settings(ProbeSettings {
            cpu_sample_window: DEFAULT_CPU_SAMPLE_WINDOW,
            probe_timeout: Duration::from_secs(2),
        });

        let probe = monitor.probe_database().await;
        assert_eq!(probe.status, DatabaseStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alerts_replaced_each_check() {
        let recorder = Arc::new(RequestRecorder::default());
        let monitor = HealthMonitor::new(
            recorder.clone(),
            Arc::new(MockMonitoringRepository::default()),
            Arc::new(FixedProbe::default().with_cpu(95.0)),
        );

        monitor.check_health().await.unwrap();
        assert_eq!(monitor.get_alerts().await.len(), 1);

        recorder.record_request(10.0, true);
        monitor.check_health().await.unwrap();
        let alerts = monitor.get_alerts().await;
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().any(|a| a.message == "Critical error rate: 100.0%"));

        monitor.clear_alerts().await;
        assert!(monitor.get_alerts().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_delegates_to_recorder() {
        let recorder = Arc::new(RequestRecorder::default());
        let monitor = HealthMonitor::new(
            recorder.clone(),
            Arc::new(MockMonitoringRepository::default()),
            Arc::new(FixedProbe::default()),
        );

        recorder.record_request(300.0, false);
        assert_eq!(monitor.get_metrics().request_count, 1);

        monitor.reset();
        assert_eq!(monitor.get_metrics().request_count, 0);
    }
}
