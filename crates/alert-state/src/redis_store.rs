//! Redis-backed [`StateStore`]. Reference networked adapter: counters use
//! `INCR`/`EXPIRE` for atomic, race-free increments; recent alerts use a
//! sorted set keyed by timestamp so `get_recent_alerts` is a cheap
//! `ZREVRANGE`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use alert_core::config::StateStoreConfig;
use alert_core::{Alert, AlertRule, AlertStatus, LogStats};

use crate::error::StateError;
use crate::store::{
    alert_key, counter_key, rule_key, status_key, StateStore, LOG_STATS_KEY, RECENT_ALERTS_CAP,
    RECENT_ALERTS_KEY,
};

const RULE_INDEX_KEY: &str = "alert_rules_index";

pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(cfg: &StateStoreConfig) -> Result<Self, StateError> {
        let client = redis::Client::open(cfg.address.as_str())
            .map_err(|e| StateError::Transient(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn save_rule(&self, rule: &AlertRule) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(rule)?;
        conn.set::<_, _, ()>(rule_key(&rule.id), payload)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        conn.sadd::<_, _, ()>(RULE_INDEX_KEY, &rule.id)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn get_rule(&self, id: &str) -> Result<AlertRule, StateError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(rule_key(id))
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        let raw = raw.ok_or(StateError::NotFound)?;
        Ok(serde_json::from_str(&raw).map_err(|e| StateError::Data(e.to_string()))?)
    }

    async fn get_rules(&self) -> Result<Vec<AlertRule>, StateError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(RULE_INDEX_KEY)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        let mut rules = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_rule(&id).await {
                Ok(rule) => rules.push(rule),
                Err(StateError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(rules)
    }

    async fn delete_rule(&self, id: &str) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(rule_key(id))
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        conn.srem::<_, _, ()>(RULE_INDEX_KEY, id)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        if removed == 0 {
            return Err(StateError::NotFound);
        }
        Ok(())
    }

    async fn increment_counter(&self, rule_id: &str, window_secs: u64) -> Result<u64, StateError> {
        let mut conn = self.conn.clone();
        let key = counter_key(rule_id, window_secs);
        let value: u64 = conn
            .incr(&key, 1u64)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        conn.expire::<_, ()>(&key, window_secs as i64)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(value)
    }

    async fn get_counter(&self, rule_id: &str, window_secs: u64) -> Result<u64, StateError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn
            .get(counter_key(rule_id, window_secs))
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(value.unwrap_or(0))
    }

    async fn set_alert_status(&self, status: &AlertStatus) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(status)?;
        conn.set::<_, _, ()>(status_key(&status.rule_id), payload)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn get_alert_status(&self, rule_id: &str) -> Result<AlertStatus, StateError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(status_key(rule_id))
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        let raw = raw.ok_or(StateError::NotFound)?;
        Ok(serde_json::from_str(&raw).map_err(|e| StateError::Data(e.to_string()))?)
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(alert)?;
        conn.set::<_, _, ()>(alert_key(&alert.id), payload)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        let score = alert.timestamp.timestamp() as f64;
        conn.zadd::<_, _, _, ()>(RECENT_ALERTS_KEY, &alert.id, score)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        conn.zremrangebyrank::<_, ()>(RECENT_ALERTS_KEY, 0, -(RECENT_ALERTS_CAP as isize) - 1)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn get_alert(&self, id: &str) -> Result<Alert, StateError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(alert_key(id))
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        let raw = raw.ok_or(StateError::NotFound)?;
        Ok(serde_json::from_str(&raw).map_err(|e| StateError::Data(e.to_string()))?)
    }

    async fn get_recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StateError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrange(RECENT_ALERTS_KEY, 0, limit as isize - 1)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        let mut alerts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_alert(&id).await {
                Ok(alert) => alerts.push(alert),
                Err(StateError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(alerts)
    }

    async fn save_log_stats(&self, stats: &LogStats) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(stats)?;
        conn.set::<_, _, ()>(LOG_STATS_KEY, payload)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn get_log_stats(&self) -> Result<LogStats, StateError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(LOG_STATS_KEY)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw).map_err(|e| StateError::Data(e.to_string()))?),
            None => Ok(LogStats::default()),
        }
    }

    async fn health_check(&self) -> Result<bool, StateError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::Transient(e.to_string()))?;
        Ok(pong == "PONG")
    }
}
