use async_trait::async_trait;

use alert_core::{Alert, AlertRule, AlertStatus, LogStats};

use crate::error::StateError;

/// Persistence for rules, counters, alert status/history, and log stats.
///
/// Every mutating operation is meant to be safe under concurrent callers;
/// `increment_counter` in particular must be atomic — this is the one
/// primitive the rest of the engine leans on.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_rule(&self, rule: &AlertRule) -> Result<(), StateError>;
    async fn get_rule(&self, id: &str) -> Result<AlertRule, StateError>;
    async fn get_rules(&self) -> Result<Vec<AlertRule>, StateError>;
    async fn delete_rule(&self, id: &str) -> Result<(), StateError>;

    /// Atomically increments `counter:<rule_id>:<window_secs>` and returns the
    /// new value. Refreshes the key's expiry to `window_secs`.
    async fn increment_counter(&self, rule_id: &str, window_secs: u64) -> Result<u64, StateError>;

    /// Non-mutating read; `0` if the key is absent or expired.
    async fn get_counter(&self, rule_id: &str, window_secs: u64) -> Result<u64, StateError>;

    async fn set_alert_status(&self, status: &AlertStatus) -> Result<(), StateError>;
    async fn get_alert_status(&self, rule_id: &str) -> Result<AlertStatus, StateError>;

    async fn save_alert(&self, alert: &Alert) -> Result<(), StateError>;
    async fn get_alert(&self, id: &str) -> Result<Alert, StateError>;
    async fn get_recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StateError>;

    async fn save_log_stats(&self, stats: &LogStats) -> Result<(), StateError>;
    async fn get_log_stats(&self) -> Result<LogStats, StateError>;

    /// Round-trip through the underlying transport; `Ok(false)` rather than an
    /// error when the store is reachable but reports itself unhealthy.
    async fn health_check(&self) -> Result<bool, StateError>;
}

pub(crate) fn counter_key(rule_id: &str, window_secs: u64) -> String {
    format!("counter:{rule_id}:{window_secs}")
}

pub(crate) fn rule_key(id: &str) -> String {
    format!("alert_rule:{id}")
}

pub(crate) fn status_key(rule_id: &str) -> String {
    format!("alert_status:{rule_id}")
}

pub(crate) fn alert_key(id: &str) -> String {
    format!("alert:{id}")
}

pub(crate) const RECENT_ALERTS_KEY: &str = "alerts_recent";
pub(crate) const LOG_STATS_KEY: &str = "log_stats";
pub(crate) const RECENT_ALERTS_CAP: usize = 500;
