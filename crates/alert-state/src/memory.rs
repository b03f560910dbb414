//! In-memory [`StateStore`], backed by `moka` for counter TTL and plain
//! `RwLock`-guarded maps for everything else. Used for tests and
//! single-process deployments that don't need a shared Redis instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use tokio::sync::RwLock;

use alert_core::{Alert, AlertRule, AlertStatus, LogStats};

use crate::error::StateError;
use crate::store::{alert_key, counter_key, rule_key, status_key, StateStore, RECENT_ALERTS_CAP};

#[derive(Debug, Clone, Copy)]
struct CounterValue {
    count: u64,
    window_secs: u64,
}

struct CounterExpiry;

impl Expiry<String, CounterValue> for CounterExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CounterValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(Duration::from_secs(value.window_secs))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CounterValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(Duration::from_secs(value.window_secs))
    }
}

pub struct InMemoryStateStore {
    counters: Cache<String, CounterValue>,
    rules: RwLock<HashMap<String, AlertRule>>,
    statuses: RwLock<HashMap<String, AlertStatus>>,
    alerts: RwLock<HashMap<String, Alert>>,
    recent_alert_ids: RwLock<VecDeque<String>>,
    log_stats: RwLock<Option<LogStats>>,
}

impl InMemoryStateStore {
    pub fn new() -> Arc<Self> {
        let counters = Cache::builder().expire_after(CounterExpiry).build();
        Arc::new(Self {
            counters,
            rules: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            alerts: RwLock::new(HashMap::new()),
            recent_alert_ids: RwLock::new(VecDeque::new()),
            log_stats: RwLock::new(None),
        })
    }
}

impl Default for Arc<InMemoryStateStore> {
    fn default() -> Self {
        InMemoryStateStore::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_rule(&self, rule: &AlertRule) -> Result<(), StateError> {
        let _ = rule_key(&rule.id);
        self.rules.write().await.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn get_rule(&self, id: &str) -> Result<AlertRule, StateError> {
        self.rules
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    async fn get_rules(&self) -> Result<Vec<AlertRule>, StateError> {
        Ok(self.rules.read().await.values().cloned().collect())
    }

    async fn delete_rule(&self, id: &str) -> Result<(), StateError> {
        self.rules
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(StateError::NotFound)
    }

    async fn increment_counter(&self, rule_id: &str, window_secs: u64) -> Result<u64, StateError> {
        let key = counter_key(rule_id, window_secs);
        let entry = self
            .counters
            .entry(key)
            .and_upsert_with(|maybe_entry| async move {
                let prev = maybe_entry.map(|e| e.into_value().count).unwrap_or(0);
                CounterValue {
                    count: prev + 1,
                    window_secs,
                }
            })
            .await;
        Ok(entry.into_value().count)
    }

    async fn get_counter(&self, rule_id: &str, window_secs: u64) -> Result<u64, StateError> {
        let key = counter_key(rule_id, window_secs);
        Ok(self.counters.get(&key).await.map(|v| v.count).unwrap_or(0))
    }

    async fn set_alert_status(&self, status: &AlertStatus) -> Result<(), StateError> {
        let _ = status_key(&status.rule_id);
        self.statuses
            .write()
            .await
            .insert(status.rule_id.clone(), status.clone());
        Ok(())
    }

    async fn get_alert_status(&self, rule_id: &str) -> Result<AlertStatus, StateError> {
        self.statuses
            .read()
            .await
            .get(rule_id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StateError> {
        let _ = alert_key(&alert.id);
        self.alerts.write().await.insert(alert.id.clone(), alert.clone());
        let mut recent = self.recent_alert_ids.write().await;
        recent.push_front(alert.id.clone());
        recent.truncate(RECENT_ALERTS_CAP);
        Ok(())
    }

    async fn get_alert(&self, id: &str) -> Result<Alert, StateError> {
        self.alerts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    async fn get_recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StateError> {
        let recent = self.recent_alert_ids.read().await;
        let alerts = self.alerts.read().await;
        Ok(recent
            .iter()
            .take(limit)
            .filter_map(|id| alerts.get(id).cloned())
            .collect())
    }

    async fn save_log_stats(&self, stats: &LogStats) -> Result<(), StateError> {
        *self.log_stats.write().await = Some(stats.clone());
        Ok(())
    }

    async fn get_log_stats(&self) -> Result<LogStats, StateError> {
        Ok(self.log_stats.read().await.clone().unwrap_or_default())
    }

    async fn health_check(&self) -> Result<bool, StateError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_rule(id: &str) -> AlertRule {
        AlertRule {
            id: id.to_string(),
            name: "test rule".into(),
            description: String::new(),
            enabled: true,
            conditions: Default::default(),
            actions: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rule_crud_round_trips() {
        let store = InMemoryStateStore::new();
        let rule = sample_rule("r1");
        store.save_rule(&rule).await.unwrap();
        let fetched = store.get_rule("r1").await.unwrap();
        assert_eq!(fetched.id, "r1");
        store.delete_rule("r1").await.unwrap();
        assert!(matches!(store.get_rule("r1").await, Err(StateError::NotFound)));
    }

    #[tokio::test]
    async fn increment_counter_is_monotonic() {
        let store = InMemoryStateStore::new();
        let a = store.increment_counter("r1", 60).await.unwrap();
        let b = store.increment_counter("r1", 60).await.unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(store.get_counter("r1", 60).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unincremented_counter_reads_zero() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get_counter("missing", 60).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_alerts_ordered_newest_first() {
        let store = InMemoryStateStore::new();
        for i in 0..3 {
            let alert = Alert {
                id: format!("a{i}"),
                rule_id: "r1".into(),
                rule_name: "rule".into(),
                log_entry: alert_core::LogEntry {
                    timestamp: Utc::now(),
                    level: "ERROR".into(),
                    message: "boom".into(),
                    service: "svc".into(),
                    namespace: "ns".into(),
                    pod: String::new(),
                    container: String::new(),
                    host: String::new(),
                    labels: HashMap::new(),
                    raw: String::new(),
                },
                timestamp: Utc::now(),
                severity: alert_core::Severity::High,
                status: alert_core::DeliveryStatus::Sent,
                count: 1,
                message: String::new(),
                channel: String::new(),
                webhook: None,
            };
            store.save_alert(&alert).await.unwrap();
        }
        let recent = store.get_recent_alerts(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, "a2");
    }
}
