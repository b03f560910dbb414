//! Core data model shared by the consumer, evaluator, state store, and notifier.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One structured log record, after envelope unwrapping and default-filling.
///
/// Created by the consumer from a single bus message; mutated only to apply
/// defaults (timestamp, level); never persisted by the core itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub service: String,
    pub namespace: String,
    #[serde(default)]
    pub pod: String,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Original serialized form, retained for debugging. Never parsed again.
    #[serde(default)]
    pub raw: String,
}

impl LogEntry {
    /// `labels["app"]`, used as the service-match condition (§4.C).
    pub fn app_label(&self) -> Option<&str> {
        self.labels.get("app").map(String::as_str)
    }
}

/// Comparison used by a rule's threshold condition against the counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Default for Operator {
    fn default() -> Self {
        Operator::Gt
    }
}

impl Operator {
    /// Evaluate `count <operator> threshold`.
    pub fn fires(&self, count: u64, threshold: u64) -> bool {
        match self {
            Operator::Gt => count > threshold,
            Operator::Gte => count >= threshold,
            Operator::Lt => count < threshold,
            Operator::Lte => count <= threshold,
            Operator::Eq => count == threshold,
        }
    }
}

/// Alert severity, also used as the key into the notifier's emoji/color maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[serde(rename = "default")]
    Default,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Default
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Default => "default",
        }
    }
}

/// Matching conditions for an [`AlertRule`]. Unset/empty fields are wildcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    pub log_level: Option<String>,
    pub namespace: Option<String>,
    pub service: Option<String>,
    /// All keywords must appear in the message (case-insensitive, AND semantics).
    pub keywords: Vec<String>,
    pub threshold: u64,
    /// Window duration in seconds — stored as seconds so the type is
    /// `Copy`-cheap and round-trips through JSON/YAML without a duration shim.
    pub time_window_secs: u64,
    pub operator: Operator,
}

impl Default for RuleConditions {
    fn default() -> Self {
        Self {
            log_level: None,
            namespace: None,
            service: None,
            keywords: Vec::new(),
            threshold: 0,
            time_window_secs: 60,
            operator: Operator::default(),
        }
    }
}

/// Actions taken when a rule's threshold is breached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleActions {
    pub channel: String,
    pub severity: Severity,
    /// Optional per-rule webhook override; falls back to the global config.
    pub webhook: Option<String>,
}

impl Default for RuleActions {
    fn default() -> Self {
        Self {
            channel: String::new(),
            severity: Severity::default(),
            webhook: None,
        }
    }
}

/// A user-defined alerting policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: RuleConditions,
    #[serde(default)]
    pub actions: RuleActions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    /// Mark the rule touched now; called by every mutating CRUD path.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Most-recent trigger metadata for a rule, last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatus {
    pub rule_id: String,
    pub last_trigger: DateTime<Utc>,
    pub count: u64,
    pub status: DeliveryStatus,
}

/// A produced notification event — the unit of work handed to the notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub log_entry: LogEntry,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub status: DeliveryStatus,
    pub count: u64,
    /// Rendered message body (filled in by the notifier's template stage).
    #[serde(default)]
    pub message: String,
    /// Per-rule delivery channel override (`rule.actions.channel`); empty
    /// means "use the notifier's default channel".
    #[serde(default)]
    pub channel: String,
    /// Per-rule webhook URL override (`rule.actions.webhook`); `None` means
    /// "use the notifier's configured webhook".
    #[serde(default)]
    pub webhook: Option<String>,
}

impl Alert {
    /// `<rule_id>-<unix_seconds>`, with a caller-supplied monotonic suffix for
    /// the rare case where more than one alert fires for a rule in the same
    /// second. Alert ids must stay unique across the process lifetime.
    pub fn make_id(rule_id: &str, at: DateTime<Utc>, suffix: u32) -> String {
        if suffix == 0 {
            format!("{rule_id}-{}", at.timestamp())
        } else {
            format!("{rule_id}-{}-{suffix}", at.timestamp())
        }
    }
}

/// Running ingestion aggregates, replaced wholesale on every persist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStats {
    pub total: u64,
    pub by_level: HashMap<String, u64>,
    pub by_service: HashMap<String, u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl LogStats {
    pub fn record(&mut self, entry: &LogEntry) {
        self.total += 1;
        *self.by_level.entry(entry.level.clone()).or_insert(0) += 1;
        *self.by_service.entry(entry.service.clone()).or_insert(0) += 1;
        self.last_updated = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_semantics() {
        assert!(Operator::Gt.fires(3, 2));
        assert!(!Operator::Gt.fires(2, 2));
        assert!(Operator::Gte.fires(2, 2));
        assert!(Operator::Lt.fires(1, 2));
        assert!(!Operator::Lte.fires(3, 2));
        assert!(Operator::Eq.fires(2, 2));
    }

    #[test]
    fn operator_default_is_gt() {
        assert_eq!(Operator::default(), Operator::Gt);
    }

    #[test]
    fn alert_id_format() {
        let at = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Alert::make_id("r1", at, 0), format!("r1-{}", at.timestamp()));
        assert_eq!(
            Alert::make_id("r1", at, 2),
            format!("r1-{}-2", at.timestamp())
        );
    }

    #[test]
    fn rule_conditions_default_is_wildcard() {
        let c = RuleConditions::default();
        assert!(c.log_level.is_none());
        assert!(c.namespace.is_none());
        assert!(c.service.is_none());
        assert!(c.keywords.is_empty());
    }

    #[test]
    fn log_stats_record_accumulates() {
        let mut stats = LogStats::default();
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: "ERROR".into(),
            message: "boom".into(),
            service: "svc-a".into(),
            namespace: "prod".into(),
            pod: String::new(),
            container: String::new(),
            host: String::new(),
            labels: HashMap::new(),
            raw: String::new(),
        };
        stats.record(&entry);
        stats.record(&entry);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_level["ERROR"], 2);
        assert_eq!(stats.by_service["svc-a"], 2);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn rule_round_trip() {
        let rule = AlertRule {
            id: "r1".into(),
            name: "Error spike".into(),
            description: String::new(),
            enabled: true,
            conditions: RuleConditions {
                log_level: Some("ERROR".into()),
                namespace: None,
                service: Some("user-service".into()),
                keywords: vec!["database".into()],
                threshold: 2,
                time_window_secs: 120,
                operator: Operator::Gte,
            },
            actions: RuleActions {
                channel: "#alerts".into(),
                severity: Severity::High,
                webhook: None,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&rule).unwrap();
        let parsed: AlertRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, rule.id);
        assert_eq!(parsed.conditions.threshold, rule.conditions.threshold);
        assert_eq!(parsed.conditions.operator, rule.conditions.operator);
        assert_eq!(parsed.actions.severity, rule.actions.severity);
    }
}
