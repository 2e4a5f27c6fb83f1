use super::exporter::MetricsExporter;
use super::{AlertSeverity, SystemMetrics};
use crate::error::MonitoringError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Rules triggered within this window are reported as active.
pub const ACTIVE_ALERT_WINDOW: Duration = Duration::from_secs(60 * 60);

pub type AlertPredicate = Arc<dyn Fn(&SystemMetrics) -> anyhow::Result<bool> + Send + Sync>;

/// A named threshold predicate over [`SystemMetrics`] with cooldown suppression.
#[derive(Clone)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub cooldown: Duration,
    pub last_triggered_at: Option<DateTime<Utc>>,
    predicate: AlertPredicate,
}

impl fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("severity", &self.severity)
            .field("cooldown", &self.cooldown)
            .field("last_triggered_at", &self.last_triggered_at)
            .finish_non_exhaustive()
    }
}

impl AlertRule {
    pub fn new<F>(
        id: impl Into<String>,
        name: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
        cooldown: Duration,
        predicate: F,
    ) -> Self
    where
        F: Fn(&SystemMetrics) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            severity,
            message: message.into(),
            cooldown,
            last_triggered_at: None,
            predicate: Arc::new(predicate),
        }
    }

    pub fn evaluate(&self, metrics: &SystemMetrics) -> anyhow::Result<bool> {
        (self.predicate)(metrics)
    }

    /// Whether the cooldown since the last trigger has elapsed at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.cooldown,
                // Clock went backwards; stay suppressed.
                Err(_) => false,
            },
        }
    }
}

/// Display record for a triggered rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FiredAlert {
    pub id: String,
    pub name: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

impl FiredAlert {
    fn from_rule(rule: &AlertRule, triggered_at: DateTime<Utc>) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            severity: rule.severity,
            message: rule.message.clone(),
            triggered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct RuleSetting {
    pub threshold: f64,
    pub cooldown_seconds: u64,
}

impl RuleSetting {
    const fn new(threshold: f64, cooldown_seconds: u64) -> Self {
        Self {
            threshold,
            cooldown_seconds,
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    fn merged(self, partial: Option<PartialRuleSetting>) -> Self {
        let Some(partial) = partial else {
            return self;
        };
        Self {
            threshold: partial.threshold.unwrap_or(self.threshold),
            cooldown_seconds: partial.cooldown_seconds.unwrap_or(self.cooldown_seconds),
        }
    }
}

/// A rule table as written in a config file; absent keys keep that rule's default.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialRuleSetting {
    threshold: Option<f64>,
    cooldown_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialAlertRuleConfig {
    high_cpu: Option<PartialRuleSetting>,
    high_memory: Option<PartialRuleSetting>,
    slow_response: Option<PartialRuleSetting>,
    high_error_rate: Option<PartialRuleSetting>,
    slow_queries: Option<PartialRuleSetting>,
    db_connections: Option<PartialRuleSetting>,
    low_throughput: Option<PartialRuleSetting>,
}

/// Thresholds and cooldowns of the built-in rule set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "PartialAlertRuleConfig")]
pub struct AlertRuleConfig {
    /// CPU usage percent.
    pub high_cpu: RuleSetting,
    /// OS memory usage percent.
    pub high_memory: RuleSetting,
    /// Average response time in milliseconds.
    pub slow_response: RuleSetting,
    /// Error percentage of all requests.
    pub high_error_rate: RuleSetting,
    /// Statements with a mean execution time over the slow threshold.
    pub slow_queries: RuleSetting,
    pub db_connections: RuleSetting,
    /// Minimum requests per minute.
    pub low_throughput: RuleSetting,
}

impl Default for AlertRuleConfig {
    fn default() -> Self {
        Self {
            high_cpu: RuleSetting::new(80.0, 5 * 60),
            high_memory: RuleSetting::new(85.0, 5 * 60),
            slow_response: RuleSetting::new(2000.0, 2 * 60),
            high_error_rate: RuleSetting::new(5.0, 60),
            slow_queries: RuleSetting::new(10.0, 10 * 60),
            db_connections: RuleSetting::new(50.0, 5 * 60),
            low_throughput: RuleSetting::new(10.0, 15 * 60),
        }
    }
}

impl From<PartialAlertRuleConfig> for AlertRuleConfig {
    fn from(partial: PartialAlertRuleConfig) -> Self {
        let defaults = Self::default();
        Self {
            high_cpu: defaults.high_cpu.merged(partial.high_cpu),
            high_memory: defaults.high_memory.merged(partial.high_memory),
            slow_response: defaults.slow_response.merged(partial.slow_response),
            high_error_rate: defaults.high_error_rate.merged(partial.high_error_rate),
            slow_queries: defaults.slow_queries.merged(partial.slow_queries),
            db_connections: defaults.db_connections.merged(partial.db_connections),
            low_throughput: defaults.low_throughput.merged(partial.low_throughput),
        }
    }
}

impl AlertRuleConfig {
    pub fn build_rules(&self) -> Vec<AlertRule> {
        let cpu = self.high_cpu.threshold;
        let memory = self.high_memory.threshold;
        let response = self.slow_response.threshold;
        let error_rate = self.high_error_rate.threshold;
        let slow_queries = self.slow_queries.threshold;
        let connections = self.db_connections.threshold;
        let throughput = self.low_throughput.threshold;

        vec![
            AlertRule::new(
                "high_cpu",
                "High CPU Usage",
                AlertSeverity::High,
                format!("CPU usage is above {cpu}%"),
                self.high_cpu.cooldown(),
                move |m| Ok(m.cpu.usage > cpu),
            ),
            AlertRule::new(
                "high_memory",
                "High Memory Usage",
                AlertSeverity::High,
                format!("Memory usage is above {memory}%"),
                self.high_memory.cooldown(),
                move |m| Ok(m.memory.percentage > memory),
            ),
            AlertRule::new(
                "slow_response",
                "Slow Response Time",
                AlertSeverity::Medium,
                format!("Average response time is above {response}ms"),
                self.slow_response.cooldown(),
                move |m| Ok(m.application.response_time > response),
            ),
            AlertRule::new(
                "high_error_rate",
                "High Error Rate",
                AlertSeverity::Critical,
                format!("Error rate is above {error_rate}%"),
                self.high_error_rate.cooldown(),
                move |m| {
                    let app = &m.application;
                    let rate = super::recorder::error_rate_percent(app.error_count, app.request_count);
                    Ok(rate > error_rate)
                },
            ),
            AlertRule::new(
                "slow_queries",
                "Slow Database Queries",
                AlertSeverity::Medium,
                format!("More than {slow_queries} slow database queries"),
                self.slow_queries.cooldown(),
                move |m| Ok(m.database.slow_queries.unwrap_or(0) as f64 > slow_queries),
            ),
            AlertRule::new(
                "db_connections",
                "Too Many Database Connections",
                AlertSeverity::High,
                format!("More than {connections} active database connections"),
                self.db_connections.cooldown(),
                move |m| Ok(m.database.connection_count.unwrap_or(0) as f64 > connections),
            ),
            AlertRule::new(
                "low_throughput",
                "Low Throughput",
                AlertSeverity::Low,
                format!("Throughput is below {throughput} requests per minute"),
                self.low_throughput.cooldown(),
                move |m| Ok(m.application.throughput < throughput),
            ),
        ]
    }
}

/// Evaluates rules against metrics snapshots and suppresses repeats within each
/// rule's cooldown.
#[derive(Debug, Default)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    exporter: Option<Arc<MetricsExporter>>,
}

impl AlertEngine {
    pub fn new(config: &AlertRuleConfig) -> Self {
        Self {
            rules: config.build_rules(),
            exporter: None,
        }
    }

    pub fn with_exporter(mut self, exporter: Arc<MetricsExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn check_alerts(&mut self, metrics: &SystemMetrics) -> Vec<FiredAlert> {
        self.check_alerts_at(metrics, Utc::now())
    }

    /// Evaluate every rule as of `now`. Returns the rules that fired in this pass.
    pub fn check_alerts_at(
        &mut self,
        metrics: &SystemMetrics,
        now: DateTime<Utc>,
    ) -> Vec<FiredAlert> {
        let mut fired = Vec::new();

        for rule in &mut self.rules {
            let triggered = match rule.evaluate(metrics) {
                Ok(triggered) => triggered,
                Err(e) => {
                    let error = MonitoringError::RuleEvaluation {
                        rule_id: rule.id.clone(),
                        reason: format!("{:#}", e),
                    };
                    warn!("{}", error);
                    continue;
                }
            };

            if !triggered {
                continue;
            }

            if !rule.is_eligible(now) {
                debug!("Alert rule {} suppressed by cooldown", rule.id);
                continue;
            }

            rule.last_triggered_at = Some(now);
            fired.push(FiredAlert::from_rule(rule, now));
        }

        for alert in &fired {
            self.send_notification(alert);
        }

        fired
    }

    /// Add a rule, replacing any existing rule with the same id.
    pub fn add_rule(&mut self, rule: AlertRule) {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.id == rule.id) {
            *existing = rule;
            info!("Updated alert rule: {}", existing.id);
        } else {
            info!("Added new alert rule: {}", rule.id);
            self.rules.push(rule);
        }
    }

    pub fn remove_rule(&mut self, rule_id: &str) -> bool {
        let initial_len = self.rules.len();
        self.rules.retain(|rule| rule.id != rule_id);
        let removed = self.rules.len() < initial_len;

        if removed {
            info!("Removed alert rule: {}", rule_id);
        }

        removed
    }

    pub fn list_active_alerts(&self) -> Vec<FiredAlert> {
        self.list_active_alerts_at(Utc::now())
    }

    /// Rules triggered within the last hour as of `now`.
    pub fn list_active_alerts_at(&self, now: DateTime<Utc>) -> Vec<FiredAlert> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let triggered_at = rule.last_triggered_at?;
                let age = (now - triggered_at).to_std().unwrap_or_default();
                (age < ACTIVE_ALERT_WINDOW).then(|| FiredAlert::from_rule(rule, triggered_at))
            })
            .collect()
    }

    /// Forget every trigger time so all rules are immediately eligible again.
    pub fn clear_alerts(&mut self) {
        for rule in &mut self.rules {
            rule.last_triggered_at = None;
        }
        info!("Cleared alert rule trigger history");
    }

    fn send_notification(&self, alert: &FiredAlert) {
        let log_message = format!("[ALERT TRIGGERED] {} - {}", alert.name, alert.message);

        match alert.severity {
            AlertSeverity::Critical => error!("{}", log_message),
            AlertSeverity::High | AlertSeverity::Medium => warn!("{}", log_message),
            AlertSeverity::Low => info!("{}", log_message),
        }

        if let Some(exporter) = &self.exporter {
            exporter.record_alert(alert.severity);
        }
    }
}
