use crate::Config;
use anyhow::Result;
use std::sync::Arc;

pub mod command_handlers;
pub mod dependency_container;
pub mod lifecycle;

pub use command_handlers::{HealthCommandHandler, MetricsCommandHandler, ServerCommandHandler};
pub use dependency_container::DependencyContainer;
pub use lifecycle::ApplicationLifecycle;

/// Application layer - wires the monitoring components and owns their lifetime
pub struct Application {
    pub container: Arc<DependencyContainer>,
    pub lifecycle: Arc<ApplicationLifecycle>,
}

impl Application {
    pub fn new(config: Config) -> Result<Self> {
        let container = Arc::new(DependencyContainer::new(config)?);
        Ok(Self::from_container(container))
    }

    pub fn from_container(container: Arc<DependencyContainer>) -> Self {
        let lifecycle = Arc::new(ApplicationLifecycle::new(container.clone()));
        Self {
            container,
            lifecycle,
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        self.lifecycle.initialize().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.lifecycle.shutdown().await
    }
}
