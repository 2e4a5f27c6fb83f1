use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitoringError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Operation timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Alert rule {rule_id} failed to evaluate: {reason}")]
    RuleEvaluation { rule_id: String, reason: String },

    #[error("Collection failed: {0}")]
    Collection(String),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, MonitoringError>;
