pub mod alerts;
pub mod collector;
pub mod dashboard;
pub mod exporter;
pub mod health;
pub mod history;
pub mod probe;
pub mod recorder;
pub mod repository;

pub use alerts::*;
pub use collector::*;
pub use dashboard::*;
pub use exporter::*;
pub use health::*;
pub use history::*;
pub use probe::*;
pub use recorder::*;
pub use repository::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Connected,
    Slow,
    Disconnected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Memory held by this process.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

impl MemoryUsage {
    pub fn resident_mb(&self) -> f64 {
        self.resident_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Point-in-time health classification produced by [`HealthMonitor::check_health`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub uptime_ms: u64,
    pub memory_usage: MemoryUsage,
    pub cpu_usage_pct: f64,
    pub database_status: DatabaseStatus,
    /// Latency of the liveness probe; absent when the probe failed.
    pub database_response_time_ms: Option<u64>,
    pub avg_response_time_ms: f64,
    pub error_rate_pct: f64,
    pub active_connections: u64,
    pub request_count: u64,
}

/// Composite snapshot produced by [`MetricsCollector::collect_metrics`].
///
/// Reads delegated to the persistent store are `Option`s: `None` means the value
/// could not be measured, which is distinct from a measured zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub database: DatabaseMetrics,
    pub application: ApplicationMetrics,
    pub business: BusinessMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    pub usage: f64,
    pub load_average: [f64; 3],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    /// Resident memory of this process in bytes.
    pub used: u64,
    pub total: u64,
    pub free: u64,
    /// OS memory in use as a percentage of total.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetrics {
    pub connection_count: Option<u64>,
    pub query_count: Option<u64>,
    pub average_query_time: Option<f64>,
    pub slow_queries: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMetrics {
    pub uptime: u64,
    pub request_count: u64,
    pub error_count: u64,
    pub response_time: f64,
    /// Requests per minute since the recorder's reference clock.
    pub throughput: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessMetrics {
    pub total_users: Option<u64>,
    pub total_books: Option<u64>,
    pub total_reviews: Option<u64>,
    pub active_users: Option<u64>,
    pub new_users_today: Option<u64>,
    pub new_reviews_today: Option<u64>,
}
