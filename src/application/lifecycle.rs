use crate::api::create_api_router;
use crate::application::DependencyContainer;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Manages application lifecycle events and graceful shutdown
pub struct ApplicationLifecycle {
    container: Arc<DependencyContainer>,
}

impl ApplicationLifecycle {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    /// Initialize the application
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing application...");

        // Validate configuration
        self.container.config.validate()?;

        // An unreachable store is reported, not fatal
        if !self.container.health_check().await {
            warn!("Database is not reachable yet; it will be reported as disconnected");
        }

        info!("Application initialized successfully");
        Ok(())
    }

    /// Serve the monitoring API until a shutdown signal arrives
    pub async fn serve(&self) -> Result<()> {
        let config = &self.container.config;
        let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
        let router = create_api_router(
            self.container.api_state(),
            Duration::from_secs(config.request_timeout_seconds),
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Monitoring dashboard listening on http://{}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(Self::wait_for_shutdown())
            .await
            .context("HTTP server error")?;

        Ok(())
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if let Some(pool) = &self.container.db_pool {
            pool.close().await;
        }

        info!("Graceful shutdown completed");
        Ok(())
    }

    /// Wait for shutdown signals
    pub async fn wait_for_shutdown() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install terminate signal handler: {}", e);
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received");
    }
}
