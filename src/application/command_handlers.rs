use crate::application::{ApplicationLifecycle, DependencyContainer};
use crate::monitoring::HealthStatus;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs the HTTP dashboard and API
pub struct ServerCommandHandler {
    lifecycle: Arc<ApplicationLifecycle>,
}

impl ServerCommandHandler {
    pub fn new(lifecycle: Arc<ApplicationLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub async fn start_http(&self) -> Result<()> {
        info!("Starting HTTP server...");
        self.lifecycle.serve().await
    }
}

/// One-shot health check printed as JSON
pub struct HealthCommandHandler {
    container: Arc<DependencyContainer>,
}

impl HealthCommandHandler {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    /// Returns the derived status so the caller can pick an exit code.
    pub async fn run_health_check(&self) -> Result<HealthStatus> {
        info!("Running system health check...");

        let health = self.container.dashboard.current_health().await?;
        match health.status {
            HealthStatus::Healthy => info!("System is healthy"),
            HealthStatus::Degraded => warn!("System is degraded"),
            HealthStatus::Unhealthy => error!("System is unhealthy"),
        }

        for alert in self.container.health_monitor.get_alerts().await {
            warn!("[{}] {}", alert.severity.as_str(), alert.message);
        }

        println!("{}", serde_json::to_string_pretty(&health)?);
        Ok(health.status)
    }
}

/// One-shot metrics snapshot printed as JSON
pub struct MetricsCommandHandler {
    container: Arc<DependencyContainer>,
}

impl MetricsCommandHandler {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    pub async fn collect(&self) -> Result<()> {
        let metrics = self.container.dashboard.current_metrics().await?;

        let alerts = self.container.alert_engine.read().await.list_active_alerts();
        for alert in &alerts {
            warn!("[{}] {}", alert.severity.as_str(), alert.message);
        }

        println!("{}", serde_json::to_string_pretty(&metrics)?);
        Ok(())
    }
}
