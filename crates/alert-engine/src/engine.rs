//! Rule evaluation orchestration: matches a log against the current rule
//! snapshot, advances each matching rule's window counter, and dispatches an
//! alert for whichever rules breach their threshold.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use alert_core::config::AlertingConfig;
use alert_core::{Alert, AlertRule, AlertStatus, DeliveryStatus, LogEntry};
use alert_notify::{DispatchOutcome, Dispatcher};
use alert_rules::{RuleEvaluator, RuleLoader};
use alert_state::StateStore;

use crate::error::EngineError;

/// Outcome of evaluating one rule against one log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    NoMatch,
    BelowThreshold { count: u64 },
    Fired { alert_id: String, status: DeliveryStatus },
}

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub rule_id: String,
    pub outcome: RuleOutcome,
}

/// Per-rule bookkeeping for same-second alert id suffixes. Keyed by rule id;
/// cleared of entries older than one hour by [`AlertEngine::cleanup`].
struct AlertIdSeq {
    last_sec: i64,
    next_suffix: u32,
}

pub struct AlertEngine {
    store: Arc<dyn StateStore>,
    evaluator: RuleEvaluator,
    loader: Arc<RuleLoader>,
    dispatcher: Arc<Dispatcher>,
    cfg: AlertingConfig,
    id_seq: Mutex<HashMap<String, AlertIdSeq>>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        loader: Arc<RuleLoader>,
        dispatcher: Arc<Dispatcher>,
        cfg: AlertingConfig,
    ) -> Self {
        Self {
            evaluator: RuleEvaluator::new(Arc::clone(&store)),
            store,
            loader,
            dispatcher,
            cfg,
            id_seq: Mutex::new(HashMap::new()),
        }
    }

    fn next_alert_id(&self, rule_id: &str, at: DateTime<Utc>) -> String {
        let sec = at.timestamp();
        let mut seq = self.id_seq.lock().unwrap();
        let entry = seq.entry(rule_id.to_string()).or_insert(AlertIdSeq {
            last_sec: sec,
            next_suffix: 0,
        });
        if entry.last_sec != sec {
            entry.last_sec = sec;
            entry.next_suffix = 0;
        }
        let suffix = entry.next_suffix;
        entry.next_suffix += 1;
        Alert::make_id(rule_id, at, suffix)
    }

    /// Evaluate one log entry against every enabled rule in the current
    /// snapshot. Never fails: a store error on one rule is logged and the
    /// remaining rules still run.
    pub async fn evaluate_log(&self, log: &LogEntry) -> Vec<EvaluationResult> {
        if !self.cfg.enabled {
            return Vec::new();
        }

        let snapshot = self.loader.snapshot();
        let mut results = Vec::with_capacity(snapshot.len());

        for rule in snapshot.iter() {
            if !rule.enabled {
                continue;
            }
            if !self.evaluator.matches(log, &rule.conditions) {
                results.push(EvaluationResult {
                    rule_id: rule.id.clone(),
                    outcome: RuleOutcome::NoMatch,
                });
                continue;
            }

            let (fired, count) = match self
                .evaluator
                .evaluate_threshold(&rule.id, &rule.conditions, log.timestamp)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "threshold evaluation failed, skipping rule");
                    continue;
                }
            };

            if !fired {
                results.push(EvaluationResult {
                    rule_id: rule.id.clone(),
                    outcome: RuleOutcome::BelowThreshold { count },
                });
                continue;
            }

            let outcome = self.fire(rule, log, count).await;
            results.push(EvaluationResult {
                rule_id: rule.id.clone(),
                outcome,
            });
        }

        results
    }

    async fn fire(&self, rule: &AlertRule, log: &LogEntry, count: u64) -> RuleOutcome {
        let now = Utc::now();
        let id = self.next_alert_id(&rule.id, now);

        let mut alert = Alert {
            id: id.clone(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            log_entry: log.clone(),
            timestamp: now,
            severity: rule.actions.severity,
            status: DeliveryStatus::Pending,
            count,
            message: String::new(),
            channel: rule.actions.channel.clone(),
            webhook: rule.actions.webhook.clone(),
        };

        // A suppressed (deduplicated) alert is recorded as delivered: the
        // equivalent alert for this key already went out, so this is not a
        // delivery failure.
        let status = match self
            .dispatcher
            .dispatch(&alert, &rule.name, count, rule.conditions.time_window_secs)
            .await
        {
            Ok(DispatchOutcome::Sent) | Ok(DispatchOutcome::Suppressed) => DeliveryStatus::Sent,
            Err(e) => {
                warn!(rule_id = %rule.id, alert_id = %id, error = %e, "alert delivery failed");
                DeliveryStatus::Failed
            }
        };
        alert.status = status;

        if let Err(e) = self.store.save_alert(&alert).await {
            warn!(alert_id = %id, error = %e, "failed to persist alert");
        }
        let alert_status = AlertStatus {
            rule_id: rule.id.clone(),
            last_trigger: now,
            count,
            status,
        };
        if let Err(e) = self.store.set_alert_status(&alert_status).await {
            warn!(rule_id = %rule.id, error = %e, "failed to persist alert status");
        }

        info!(rule_id = %rule.id, alert_id = %id, ?status, "rule fired");
        RuleOutcome::Fired { alert_id: id, status }
    }

    pub async fn add_rule(&self, rule: &AlertRule) -> Result<(), EngineError> {
        self.store.save_rule(rule).await?;
        self.loader.refresh_snapshot().await?;
        Ok(())
    }

    pub async fn update_rule(&self, rule: &AlertRule) -> Result<(), EngineError> {
        self.store.save_rule(rule).await?;
        self.loader.refresh_snapshot().await?;
        Ok(())
    }

    pub async fn delete_rule(&self, id: &str) -> Result<(), EngineError> {
        self.store.delete_rule(id).await?;
        self.loader.refresh_snapshot().await?;
        Ok(())
    }

    pub async fn get_rule(&self, id: &str) -> Result<AlertRule, EngineError> {
        Ok(self.store.get_rule(id).await?)
    }

    pub async fn get_rules(&self) -> Result<Vec<AlertRule>, EngineError> {
        Ok(self.store.get_rules().await?)
    }

    pub async fn reload_rules(&self) -> Result<(), EngineError> {
        self.loader.refresh_snapshot().await?;
        Ok(())
    }

    pub async fn persist_log_stats(&self, stats: &alert_core::LogStats) -> Result<(), EngineError> {
        self.store.save_log_stats(stats).await?;
        Ok(())
    }

    /// Drop id-sequence bookkeeping older than one hour. Run on a fixed
    /// interval for the lifetime of the engine (see
    /// [`AlertEngine::run_cleanup_loop`]).
    fn cleanup(&self) {
        let cutoff = Utc::now().timestamp() - 3600;
        let mut seq = self.id_seq.lock().unwrap();
        let before = seq.len();
        seq.retain(|_, v| v.last_sec >= cutoff);
        let dropped = before - seq.len();
        if dropped > 0 {
            tracing::debug!(dropped, "cleaned up stale alert id sequences");
        }
    }

    /// Periodic cleanup task; exits when `cancel` fires.
    pub async fn run_cleanup_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
            self.cfg.cleanup_interval_secs.max(1),
        ));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.cleanup(),
                _ = cancel.cancelled() => {
                    info!("alert engine cleanup loop stopped");
                    return;
                }
            }
        }
    }
}
