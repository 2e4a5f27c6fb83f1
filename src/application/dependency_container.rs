use crate::{
    api::AppState,
    monitoring::{
        AlertEngine, DatabaseStatus, HealthMonitor, MetricsCollector, MetricsExporter,
        MonitoringDashboard, MonitoringRepository, PostgresMonitoringRepository,
        RequestRecorder, ResourceProbe, SysinfoProbe,
    },
    Config,
};
use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Dependency injection container for the application.
///
/// Every shared monitoring component is built exactly once here and handed out
/// by `Arc`, so the recorder, rule engine and histories are single instances
/// per process without any global state.
pub struct DependencyContainer {
    // Core configuration
    pub config: Config,

    // Database layer; absent when wired around an in-memory store
    pub db_pool: Option<Arc<PgPool>>,
    pub repository: Arc<dyn MonitoringRepository>,

    // Probes and recorders
    pub probe: Arc<dyn ResourceProbe>,
    pub recorder: Arc<RequestRecorder>,
    pub exporter: Arc<MetricsExporter>,

    // Monitoring services
    pub alert_engine: Arc<RwLock<AlertEngine>>,
    pub health_monitor: Arc<HealthMonitor>,
    pub collector: Arc<MetricsCollector>,
    pub dashboard: Arc<MonitoringDashboard>,
}

impl DependencyContainer {
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing dependency container...");

        let db_pool = Arc::new(create_pool(&config)?);
        let repository: Arc<dyn MonitoringRepository> = Arc::new(
            PostgresMonitoringRepository::new(db_pool.clone())
                .with_slow_query_threshold(config.monitoring.slow_query_threshold_ms),
        );
        let probe: Arc<dyn ResourceProbe> = Arc::new(SysinfoProbe::new()?);

        let mut container = Self::with_components(config, repository, probe)?;
        container.db_pool = Some(db_pool);
        Ok(container)
    }

    /// Wire the monitoring services around an existing store and probe.
    pub fn with_components(
        config: Config,
        repository: Arc<dyn MonitoringRepository>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Result<Self> {
        let monitoring = &config.monitoring;
        let settings = monitoring.probe_settings();

        let exporter = Arc::new(MetricsExporter::new()?);
        let recorder = Arc::new(RequestRecorder::new(monitoring.sample_capacity));

        let alert_engine = Arc::new(RwLock::new(
            AlertEngine::new(&monitoring.alert_rules).with_exporter(exporter.clone()),
        ));

        let health_monitor = Arc::new(
            HealthMonitor::new(recorder.clone(), repository.clone(), probe.clone())
                .with_thresholds(monitoring.thresholds.clone())
                .with_settings(settings)
                .with_exporter(exporter.clone()),
        );

        let collector = Arc::new(
            MetricsCollector::new(
                recorder.clone(),
                repository.clone(),
                probe.clone(),
                alert_engine.clone(),
            )
            .with_settings(settings)
            .with_exporter(exporter.clone()),
        );

        let dashboard = Arc::new(MonitoringDashboard::with_capacity(
            health_monitor.clone(),
            collector.clone(),
            monitoring.history_capacity,
        ));

        info!("Dependency container initialized successfully");

        Ok(Self {
            config,
            db_pool: None,
            repository,
            probe,
            recorder,
            exporter,
            alert_engine,
            health_monitor,
            collector,
            dashboard,
        })
    }

    pub fn api_state(&self) -> AppState {
        AppState {
            dashboard: self.dashboard.clone(),
            recorder: self.recorder.clone(),
            exporter: self.exporter.clone(),
        }
    }

    /// Quick liveness check of the review store
    pub async fn health_check(&self) -> bool {
        self.health_monitor.probe_database().await.status != DatabaseStatus::Disconnected
    }
}

/// Pool that connects on first use, so the monitor comes up even while the
/// database is unreachable and reports it as disconnected.
fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .acquire_timeout(Duration::from_millis(config.monitoring.probe_timeout_ms))
        .idle_timeout(Some(Duration::from_secs(300)))
        .connect_lazy(&config.database_url)
        .context("Invalid database URL")?;

    Ok(pool)
}
