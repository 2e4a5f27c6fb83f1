pub mod api;
pub mod application;
pub mod config;
pub mod error;
pub mod monitoring;

pub use config::{Config, MonitoringConfig};
pub use error::{MonitoringError, Result};

// Re-export monitoring types
pub use monitoring::{
    AlertEngine, AlertRule, AlertSeverity, DatabaseStatus, FiredAlert, HealthMetrics,
    HealthMonitor, HealthStatus, MetricsCollector, MetricsExporter, MonitoringDashboard,
    MonitoringRepository, PostgresMonitoringRepository, RequestRecorder, ResourceProbe,
    SysinfoProbe, SystemMetrics,
};
