use super::MemoryUsage;
use crate::error::{MonitoringError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sysinfo::{Pid, System};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemMemory {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

impl SystemMemory {
    /// OS memory in use as a percentage of total, 0 when the total is unknown.
    pub fn used_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Process and operating-system resource probes.
#[async_trait]
pub trait ResourceProbe: Send + Sync + std::fmt::Debug {
    /// CPU time consumed by this process over `window`, as a percentage of the
    /// wall time elapsed. Multi-threaded work can exceed 100.
    async fn sample_cpu(&self, window: Duration) -> Result<f64>;

    fn process_memory(&self) -> Result<MemoryUsage>;

    fn system_memory(&self) -> SystemMemory;

    /// One, five and fifteen minute load averages; zeros where unsupported.
    fn load_average(&self) -> [f64; 3];
}

/// Probes backed by the `sysinfo` crate.
#[derive(Debug, Clone)]
pub struct SysinfoProbe {
    pid: Pid,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| MonitoringError::Probe(format!("Cannot resolve current pid: {e}")))?;
        Ok(Self { pid })
    }

    pub fn for_pid(pid: Pid) -> Self {
        Self { pid }
    }
}

#[async_trait]
impl ResourceProbe for SysinfoProbe {
    async fn sample_cpu(&self, window: Duration) -> Result<f64> {
        // Each sample owns its System so concurrent windows stay independent.
        let mut system = System::new();
        if !system.refresh_process(self.pid) {
            return Err(MonitoringError::Probe(format!(
                "Process {} not found",
                self.pid
            )));
        }

        tokio::time::sleep(window).await;
        system.refresh_process(self.pid);

        let usage = system
            .process(self.pid)
            .map(|process| process.cpu_usage() as f64)
            .ok_or_else(|| MonitoringError::Probe(format!("Process {} vanished", self.pid)))?;

        debug!("CPU sample over {}ms: {:.1}%", window.as_millis(), usage);
        Ok(usage)
    }

    fn process_memory(&self) -> Result<MemoryUsage> {
        let mut system = System::new();
        system.refresh_process(self.pid);
        system
            .process(self.pid)
            .map(|process| MemoryUsage {
                resident_bytes: process.memory(),
                virtual_bytes: process.virtual_memory(),
            })
            .ok_or_else(|| MonitoringError::Probe(format!("Process {} not found", self.pid)))
    }

    fn system_memory(&self) -> SystemMemory {
        let mut system = System::new();
        system.refresh_memory();
        SystemMemory {
            total_bytes: system.total_memory(),
            free_bytes: system.free_memory(),
            available_bytes: system.available_memory(),
        }
    }

    fn load_average(&self) -> [f64; 3] {
        let load = System::load_average();
        [load.one, load.five, load.fifteen]
    }
}

/// Probe returning configured values. Used by tests and the CLI dry runs.
#[derive(Debug)]
pub struct FixedProbe {
    pub cpu_percent: f64,
    pub memory: MemoryUsage,
    pub system: SystemMemory,
    pub load: [f64; 3],
    /// Process reads fail, as when the process cannot be inspected.
    pub process_unavailable: bool,
    cpu_samples: AtomicU64,
}

impl Default for FixedProbe {
    fn default() -> Self {
        Self {
            cpu_percent: 12.5,
            memory: MemoryUsage {
                resident_bytes: 128 * 1024 * 1024,
                virtual_bytes: 512 * 1024 * 1024,
            },
            system: SystemMemory {
                total_bytes: 16 * 1024 * 1024 * 1024,
                free_bytes: 8 * 1024 * 1024 * 1024,
                available_bytes: 10 * 1024 * 1024 * 1024,
            },
            load: [0.5, 0.4, 0.3],
            process_unavailable: false,
            cpu_samples: AtomicU64::new(0),
        }
    }
}

impl FixedProbe {
    pub fn with_cpu(mut self, cpu_percent: f64) -> Self {
        self.cpu_percent = cpu_percent;
        self
    }

    pub fn with_resident_mb(mut self, megabytes: u64) -> Self {
        self.memory.resident_bytes = megabytes * 1024 * 1024;
        self
    }

    pub fn with_process_unavailable(mut self) -> Self {
        self.process_unavailable = true;
        self
    }

    pub fn cpu_sample_count(&self) -> u64 {
        self.cpu_samples.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProbe for FixedProbe {
    async fn sample_cpu(&self, window: Duration) -> Result<f64> {
        self.cpu_samples.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(window).await;
        if self.process_unavailable {
            return Err(MonitoringError::Probe("process not found".to_string()));
        }
        Ok(self.cpu_percent)
    }

    fn process_memory(&self) -> Result<MemoryUsage> {
        if self.process_unavailable {
            return Err(MonitoringError::Probe("process not found".to_string()));
        }
        Ok(self.memory)
    }

    fn system_memory(&self) -> SystemMemory {
        self.system
    }

    fn load_average(&self) -> [f64; 3] {
        self.load
    }
}
