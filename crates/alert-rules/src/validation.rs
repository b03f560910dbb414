//! Structured [`AlertRule`] validation: errors block a save, warnings are
//! advisory.

use serde::{Deserialize, Serialize};

use alert_core::AlertRule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate an [`AlertRule`] before it is persisted.
pub fn validate_rule(rule: &AlertRule) -> ValidationResult {
    let mut result = ValidationResult::new();

    if rule.id.trim().is_empty() {
        result.error("id", "rule id must not be empty");
    }
    if rule.name.trim().is_empty() {
        result.error("name", "rule name must not be empty");
    }

    if rule.conditions.keywords.is_empty()
        && rule.conditions.log_level.is_none()
        && rule.conditions.namespace.is_none()
        && rule.conditions.service.is_none()
    {
        result.warn(
            "conditions",
            "rule has no match conditions and will match every log; this is usually unintentional",
        );
    }

    if rule.conditions.time_window_secs == 0 {
        result.error("conditions.time_window_secs", "time window must be greater than zero");
    }

    if rule.actions.channel.trim().is_empty() && rule.actions.webhook.is_none() {
        result.warn(
            "actions.channel",
            "no channel or per-rule webhook override set; delivery falls back to the global webhook config",
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::{RuleActions, RuleConditions};
    use chrono::Utc;

    fn base_rule() -> AlertRule {
        AlertRule {
            id: "r1".into(),
            name: "rule".into(),
            description: String::new(),
            enabled: true,
            conditions: RuleConditions::default(),
            actions: RuleActions::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_id_is_an_error() {
        let mut rule = base_rule();
        rule.id = String::new();
        let result = validate_rule(&rule);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.path == "id"));
    }

    #[test]
    fn zero_window_is_an_error() {
        let mut rule = base_rule();
        rule.conditions.time_window_secs = 0;
        let result = validate_rule(&rule);
        assert!(!result.valid);
    }

    #[test]
    fn wildcard_conditions_warn_but_do_not_block() {
        let rule = base_rule();
        let result = validate_rule(&rule);
        assert!(result.valid);
        assert!(!result.warnings.is_empty());
    }
}
