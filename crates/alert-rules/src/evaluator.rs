//! Pure log matching and threshold evaluation.
//!
//! No I/O except through the `StateStore` handle passed to
//! `evaluate_threshold`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use alert_core::{AlertRule, LogEntry, RuleConditions};
use alert_state::StateStore;

#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("state store error: {0}")]
    Store(#[from] alert_state::StateError),
}

pub struct RuleEvaluator {
    store: Arc<dyn StateStore>,
}

impl RuleEvaluator {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// True iff every non-empty condition field holds against `log`.
    pub fn matches(&self, log: &LogEntry, conditions: &RuleConditions) -> bool {
        if let Some(level) = &conditions.log_level {
            if &log.level != level {
                return false;
            }
        }
        if let Some(namespace) = &conditions.namespace {
            if &log.namespace != namespace {
                return false;
            }
        }
        if let Some(service) = &conditions.service {
            if log.app_label() != Some(service.as_str()) {
                return false;
            }
        }
        let message_lower = log.message.to_lowercase();
        conditions
            .keywords
            .iter()
            .all(|kw| message_lower.contains(&kw.to_lowercase()))
    }

    /// Increments the rule's window counter and compares against the
    /// configured operator/threshold. Returns `(fired, count)`.
    pub async fn evaluate_threshold(
        &self,
        rule_id: &str,
        conditions: &RuleConditions,
        _timestamp: DateTime<Utc>,
    ) -> Result<(bool, u64), EvaluatorError> {
        let count = self
            .store
            .increment_counter(rule_id, conditions.time_window_secs)
            .await?;
        let fired = conditions.operator.fires(count, conditions.threshold);
        Ok((fired, count))
    }
}

/// Result of a stateless dry-run against sample logs, used by authoring
/// tooling outside this crate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleTestResult {
    pub matched_count: usize,
    pub matched_messages: Vec<String>,
    pub would_trigger: bool,
}

/// Pure dry-run: matches `sample_logs` against `rule.conditions` and reports
/// whether the match count alone would breach the threshold. Does not touch
/// the state store, so it cannot reflect counters accumulated from prior
/// traffic.
pub fn test_rule(rule: &AlertRule, sample_logs: &[LogEntry]) -> RuleTestResult {
    let evaluator = StatelessMatcher;
    let matched: Vec<&LogEntry> = sample_logs
        .iter()
        .filter(|log| evaluator.matches(log, &rule.conditions))
        .collect();

    let would_trigger = rule
        .conditions
        .operator
        .fires(matched.len() as u64, rule.conditions.threshold);

    RuleTestResult {
        matched_count: matched.len(),
        matched_messages: matched.iter().map(|l| l.message.clone()).collect(),
        would_trigger,
    }
}

/// Matching logic factored out so `test_rule` doesn't need a `StateStore`.
struct StatelessMatcher;

impl StatelessMatcher {
    fn matches(&self, log: &LogEntry, conditions: &RuleConditions) -> bool {
        if let Some(level) = &conditions.log_level {
            if &log.level != level {
                return false;
            }
        }
        if let Some(namespace) = &conditions.namespace {
            if &log.namespace != namespace {
                return false;
            }
        }
        if let Some(service) = &conditions.service {
            if log.app_label() != Some(service.as_str()) {
                return false;
            }
        }
        let message_lower = log.message.to_lowercase();
        conditions
            .keywords
            .iter()
            .all(|kw| message_lower.contains(&kw.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::Operator;
    use alert_state::InMemoryStateStore;
    use std::collections::HashMap;

    fn log(level: &str, namespace: &str, service: &str, message: &str) -> LogEntry {
        let mut labels = HashMap::new();
        labels.insert("app".to_string(), service.to_string());
        LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
            service: service.to_string(),
            namespace: namespace.to_string(),
            pod: String::new(),
            container: String::new(),
            host: String::new(),
            labels,
            raw: String::new(),
        }
    }

    #[tokio::test]
    async fn matches_respects_all_conditions() {
        let store = InMemoryStateStore::new();
        let evaluator = RuleEvaluator::new(store);
        let conditions = RuleConditions {
            log_level: Some("ERROR".into()),
            namespace: Some("prod".into()),
            service: Some("user-service".into()),
            keywords: vec!["database".into()],
            threshold: 1,
            time_window_secs: 60,
            operator: Operator::Gte,
        };

        assert!(evaluator.matches(&log("ERROR", "prod", "user-service", "database down"), &conditions));
        assert!(!evaluator.matches(&log("INFO", "prod", "user-service", "database down"), &conditions));
        assert!(!evaluator.matches(&log("ERROR", "staging", "user-service", "database down"), &conditions));
        assert!(!evaluator.matches(&log("ERROR", "prod", "other-service", "database down"), &conditions));
        assert!(!evaluator.matches(&log("ERROR", "prod", "user-service", "disk full"), &conditions));
    }

    #[test]
    fn empty_conditions_are_wildcards() {
        let store = alert_state::InMemoryStateStore::new();
        let evaluator = RuleEvaluator::new(store);
        let conditions = RuleConditions::default();
        assert!(evaluator.matches(&log("INFO", "any", "any", "anything"), &conditions));
    }

    #[tokio::test]
    async fn evaluate_threshold_counts_and_compares() {
        let store = InMemoryStateStore::new();
        let evaluator = RuleEvaluator::new(store);
        let conditions = RuleConditions {
            threshold: 2,
            operator: Operator::Gte,
            time_window_secs: 60,
            ..Default::default()
        };
        let (fired1, count1) = evaluator.evaluate_threshold("r1", &conditions, Utc::now()).await.unwrap();
        assert!(!fired1);
        assert_eq!(count1, 1);
        let (fired2, count2) = evaluator.evaluate_threshold("r1", &conditions, Utc::now()).await.unwrap();
        assert!(fired2);
        assert_eq!(count2, 2);
    }

    #[test]
    fn test_rule_reports_match_count_without_touching_store() {
        let rule = AlertRule {
            id: "r1".into(),
            name: "test".into(),
            description: String::new(),
            enabled: true,
            conditions: RuleConditions {
                keywords: vec!["timeout".into()],
                threshold: 1,
                operator: Operator::Gte,
                ..Default::default()
            },
            actions: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let logs = vec![
            log("ERROR", "prod", "svc", "connection timeout"),
            log("ERROR", "prod", "svc", "all good"),
        ];
        let result = test_rule(&rule, &logs);
        assert_eq!(result.matched_count, 1);
        assert!(result.would_trigger);
    }
}
