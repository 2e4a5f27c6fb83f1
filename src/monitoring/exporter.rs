use super::{AlertSeverity, HealthMetrics, HealthStatus, SystemMetrics};
use crate::error::Result;
use prometheus::{Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Mirrors the latest snapshots into a Prometheus registry.
pub struct MetricsExporter {
    registry: Arc<Registry>,

    // System metrics
    pub cpu_usage_percent: Gauge,
    pub memory_resident_bytes: IntGauge,
    pub memory_usage_percent: Gauge,

    // Application metrics
    pub requests_total: IntGauge,
    pub request_errors_total: IntGauge,
    pub avg_response_time_ms: Gauge,
    pub error_rate_percent: Gauge,
    pub throughput_per_minute: Gauge,
    pub active_connections: IntGauge,

    // Database metrics
    pub db_connections_active: IntGauge,
    pub db_slow_queries: IntGauge,

    // Business metrics
    pub users_total: IntGauge,
    pub books_total: IntGauge,
    pub reviews_total: IntGauge,

    // Health
    pub health_status: IntGauge,
    pub alerts_fired_total: IntCounterVec,
}

impl fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let cpu_usage_percent = Gauge::with_opts(Opts::new(
            "bookshelf_cpu_usage_percent",
            "Process CPU usage percentage",
        ))?;
        registry.register(Box::new(cpu_usage_percent.clone()))?;

        let memory_resident_bytes = IntGauge::with_opts(Opts::new(
            "bookshelf_memory_resident_bytes",
            "Resident memory of the process in bytes",
        ))?;
        registry.register(Box::new(memory_resident_bytes.clone()))?;

        let memory_usage_percent = Gauge::with_opts(Opts::new(
            "bookshelf_memory_usage_percent",
            "Operating system memory in use as a percentage of total",
        ))?;
        registry.register(Box::new(memory_usage_percent.clone()))?;

        let requests_total = IntGauge::with_opts(Opts::new(
            "bookshelf_requests_total",
            "Requests observed since the last recorder reset",
        ))?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_errors_total = IntGauge::with_opts(Opts::new(
            "bookshelf_request_errors_total",
            "Failed requests observed since the last recorder reset",
        ))?;
        registry.register(Box::new(request_errors_total.clone()))?;

        let avg_response_time_ms = Gauge::with_opts(Opts::new(
            "bookshelf_avg_response_time_ms",
            "Mean response time over the rolling window in milliseconds",
        ))?;
        registry.register(Box::new(avg_response_time_ms.clone()))?;

        let error_rate_percent = Gauge::with_opts(Opts::new(
            "bookshelf_error_rate_percent",
            "Current error rate percentage",
        ))?;
        registry.register(Box::new(error_rate_percent.clone()))?;

        let throughput_per_minute = Gauge::with_opts(Opts::new(
            "bookshelf_throughput_per_minute",
            "Requests per minute since the recorder started",
        ))?;
        registry.register(Box::new(throughput_per_minute.clone()))?;

        let active_connections = IntGauge::with_opts(Opts::new(
            "bookshelf_requests_in_flight",
            "Number of requests currently being processed",
        ))?;
        registry.register(Box::new(active_connections.clone()))?;

        let db_connections_active = IntGauge::with_opts(Opts::new(
            "bookshelf_db_connections_active",
            "Number of active database connections",
        ))?;
        registry.register(Box::new(db_connections_active.clone()))?;

        let db_slow_queries = IntGauge::with_opts(Opts::new(
            "bookshelf_db_slow_queries",
            "Statements whose mean execution time exceeds the slow threshold",
        ))?;
        registry.register(Box::new(db_slow_queries.clone()))?;

        let users_total = IntGauge::with_opts(Opts::new("bookshelf_users", "Registered users"))?;
        registry.register(Box::new(users_total.clone()))?;

        let books_total = IntGauge::with_opts(Opts::new("bookshelf_books", "Books in the catalog"))?;
        registry.register(Box::new(books_total.clone()))?;

        let reviews_total = IntGauge::with_opts(Opts::new("bookshelf_reviews", "Published reviews"))?;
        registry.register(Box::new(reviews_total.clone()))?;

        let health_status = IntGauge::with_opts(Opts::new(
            "bookshelf_health_status",
            "Overall health: 0 healthy, 1 degraded, 2 unhealthy",
        ))?;
        registry.register(Box::new(health_status.clone()))?;

        let alerts_fired_total = IntCounterVec::new(
            Opts::new("bookshelf_alerts_fired_total", "Alert rule triggers by severity"),
            &["severity"],
        )?;
        registry.register(Box::new(alerts_fired_total.clone()))?;

        #[cfg(target_os = "linux")]
        {
            let process_collector = prometheus::process_collector::ProcessCollector::for_self();
            registry.register(Box::new(process_collector))?;
        }

        info!("Initialized Prometheus metrics exporter");

        Ok(Self {
            registry,
            cpu_usage_percent,
            memory_resident_bytes,
            memory_usage_percent,
            requests_total,
            request_errors_total,
            avg_response_time_ms,
            error_rate_percent,
            throughput_per_minute,
            active_connections,
            db_connections_active,
            db_slow_queries,
            users_total,
            books_total,
            reviews_total,
            health_status,
            alerts_fired_total,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn observe_system_metrics(&self, metrics: &SystemMetrics) {
        self.cpu_usage_percent.set(metrics.cpu.usage);
        self.memory_resident_bytes.set(metrics.memory.used as i64);
        self.memory_usage_percent.set(metrics.memory.percentage);

        let app = &metrics.application;
        self.requests_total.set(app.request_count as i64);
        self.request_errors_total.set(app.error_count as i64);
        self.avg_response_time_ms.set(app.response_time);
        self.throughput_per_minute.set(app.throughput);

        // Unavailable reads keep the previous value rather than reporting zero.
        if let Some(count) = metrics.database.connection_count {
            self.db_connections_active.set(count as i64);
        }
        if let Some(slow) = metrics.database.slow_queries {
            self.db_slow_queries.set(slow as i64);
        }
        if let Some(users) = metrics.business.total_users {
            self.users_total.set(users as i64);
        }
        if let Some(books) = metrics.business.total_books {
            self.books_total.set(books as i64);
        }
        if let Some(reviews) = metrics.business.total_reviews {
            self.reviews_total.set(reviews as i64);
        }
    }

    pub fn observe_health(&self, health: &HealthMetrics) {
        self.health_status.set(match health.status {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        });
        self.error_rate_percent.set(health.error_rate_pct);
        self.active_connections.set(health.active_connections as i64);
    }

    pub fn record_alert(&self, severity: AlertSeverity) {
        self.alerts_fired_total
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    /// Get metrics in Prometheus format
    pub fn gather_metrics(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_else(|e| {
                error!("Failed to encode metrics: {}", e);
                String::new()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_creation() {
        let exporter = MetricsExporter::new().unwrap();
        assert_eq!(exporter.requests_total.get(), 0);
        assert_eq!(exporter.health_status.get(), 0);
    }

    #[test]
    fn test_observe_system_metrics() {
        let exporter = MetricsExporter::new().unwrap();
        let mut metrics = SystemMetrics::default();
        metrics.cpu.usage = 75.5;
        metrics.application.request_count = 40;
        metrics.business.total_books = Some(12);

        exporter.observe_system_metrics(&metrics);

        assert_eq!(exporter.cpu_usage_percent.get(), 75.5);
        assert_eq!(exporter.requests_total.get(), 40);
        assert_eq!(exporter.books_total.get(), 12);

        metrics.business.total_books = None;
        exporter.observe_system_metrics(&metrics);
        assert_eq!(exporter.books_total.get(), 12);
    }

    #[test]
    fn test_alert_counter_and_encoding() {
        let exporter = MetricsExporter::new().unwrap();
        exporter.record_alert(AlertSeverity::Critical);
        exporter.record_alert(AlertSeverity::Critical);

        assert_eq!(
            exporter
                .alerts_fired_total
                .with_label_values(&["critical"])
                .get(),
            2
        );

        let text = exporter.gather_metrics();
        assert!(text.contains("bookshelf_alerts_fired_total"));
        assert!(text.contains("bookshelf_health_status"));
    }
}
