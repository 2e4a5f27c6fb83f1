use super::alerts::AlertEngine;
use super::exporter::MetricsExporter;
use super::health::ProbeSettings;
use super::probe::ResourceProbe;
use super::recorder::RequestRecorder;
use super::repository::MonitoringRepository;
use super::{
    ApplicationMetrics, BusinessMetrics, CpuMetrics, DatabaseMetrics, MemoryMetrics,
    SystemMetrics,
};
use crate::error::{MonitoringError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Requests per minute over `uptime_ms`; a zero-length window has no throughput.
pub fn throughput_per_minute(request_count: u64, uptime_ms: u64) -> f64 {
    if uptime_ms == 0 {
        return 0.0;
    }
    request_count as f64 / (uptime_ms as f64 / 60_000.0)
}

/// Start of the current local day, in UTC.
pub fn local_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        // Midnight skipped by a DST transition; fall back to a day ago.
        .unwrap_or_else(|| now.with_timezone(&Utc) - ChronoDuration::hours(24))
}

/// Builds composite [`SystemMetrics`] snapshots and feeds them to the alert engine.
///
/// Each section fails soft: a probe or store read that errors or times out is
/// logged and reported as unavailable (or zero for process probes).
#[derive(Debug)]
pub struct MetricsCollector {
    recorder: Arc<RequestRecorder>,
    repository: Arc<dyn MonitoringRepository>,
    probe: Arc<dyn ResourceProbe>,
    alert_engine: Arc<RwLock<AlertEngine>>,
    settings: ProbeSettings,
    exporter: Option<Arc<MetricsExporter>>,
}

impl MetricsCollector {
    pub fn new(
        recorder: Arc<RequestRecorder>,
        repository: Arc<dyn MonitoringRepository>,
        probe: Arc<dyn ResourceProbe>,
        alert_engine: Arc<RwLock<AlertEngine>>,
    ) -> Self {
        Self {
            recorder,
            repository,
            probe,
            alert_engine,
            settings: ProbeSettings::default(),
            exporter: None,
        }
    }

    pub fn with_settings(mut self, settings: ProbeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<MetricsExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn alert_engine(&self) -> Arc<RwLock<AlertEngine>> {
        self.alert_engine.clone()
    }

    /// Build a snapshot and run the alert rules over it.
    ///
    /// Currently always `Ok`: every section falls back to zeroed or `None` readings
    /// when its source fails. Callers still map `Err` to an endpoint error.
    pub async fn collect_metrics(&self) -> Result<SystemMetrics> {
        let started = Instant::now();

        let (cpu, database, business) = tokio::join!(
            self.collect_cpu(),
            self.collect_database(),
            self.collect_business()
        );

        let metrics = SystemMetrics {
            timestamp: Utc::now(),
            cpu,
            memory: self.collect_memory(),
            database,
            application: self.collect_application(),
            business,
        };

        let fired = self.alert_engine.write().await.check_alerts(&metrics);
        if !fired.is_empty() {
            debug!("{} alert rule(s) fired", fired.len());
        }

        if let Some(exporter) = &self.exporter {
            exporter.observe_system_metrics(&metrics);
        }

        debug!(
            "Metrics collection completed in {}ms",
            started.elapsed().as_millis()
        );

        Ok(metrics)
    }

    async fn collect_cpu(&self) -> CpuMetrics {
        let usage = match self.probe.sample_cpu(self.settings.cpu_sample_window).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("CPU sampling failed: {}", e);
                0.0
            }
        };

        CpuMetrics {
            usage,
            load_average: self.probe.load_average(),
        }
    }

    fn collect_memory(&self) -> MemoryMetrics {
        let resident = match self.probe.process_memory() {
            Ok(memory) => memory.resident_bytes,
            Err(e) => {
                warn!("Process memory probe failed: {}", e);
                0
            }
        };
        let system = self.probe.system_memory();

        MemoryMetrics {
            used: resident,
            total: system.total_bytes,
            free: system.free_bytes,
            percentage: system.used_percentage(),
        }
    }

    async fn collect_database(&self) -> DatabaseMetrics {
        let (connections, statistics) = tokio::join!(
            self.soft("active connections", self.repository.active_connections()),
            self.soft("query statistics", self.repository.query_statistics())
        );

        let statistics = statistics.flatten();
        DatabaseMetrics {
            connection_count: connections,
            query_count: statistics.map(|s| s.query_count),
            average_query_time: statistics.map(|s| s.average_query_time_ms),
            slow_queries: statistics.map(|s| s.slow_queries),
        }
    }

    fn collect_application(&self) -> ApplicationMetrics {
        let recorded = self.recorder.metrics();
        ApplicationMetrics {
            uptime: recorded.uptime_ms,
            request_count: recorded.request_count,
            error_count: recorded.error_count,
            response_time: recorded.avg_response_time,
            throughput: throughput_per_minute(recorded.request_count, recorded.uptime_ms),
        }
    }

    async fn collect_business(&self) -> BusinessMetrics {
        let now = Utc::now();
        let day_ago = now - ChronoDuration::hours(24);
        let midnight = local_midnight(Local::now());
        let repository = &self.repository;

        let (total_users, total_books, total_reviews, active_users, new_users, new_reviews) = tokio::join!(
            self.soft("user count", repository.count_users()),
            self.soft("book count", repository.count_books()),
            self.soft("review count", repository.count_reviews()),
            self.soft("active users", repository.count_active_users(day_ago)),
            self.soft("new users", repository.count_new_users(midnight)),
            self.soft("new reviews", repository.count_new_reviews(midnight)),
        );

        BusinessMetrics {
            total_users,
            total_books,
            total_reviews,
            active_users,
            new_users_today: new_users,
            new_reviews_today: new_reviews,
        }
    }

    /// Await a store read under the probe timeout; failures become `None`.
    async fn soft<T>(&self, what: &str, read: impl Future<Output = Result<T>>) -> Option<T> {
        match tokio::time::timeout(self.settings.probe_timeout, read).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Failed to read {}: {}", what, e);
                None
            }
            Err(_) => {
                let error = MonitoringError::Timeout {
                    operation: format!("reading {}", what),
                    timeout_ms: self.settings.probe_timeout.as_millis() as u64,
                };
                warn!("{}", error);
                None
            }
        }
    }
}
