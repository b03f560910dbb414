//! Minijinja rendering of alert templates.
//!
//! A fresh [`minijinja::Environment`] is built per render call since
//! templates are dynamic config strings, not pre-registered files.

use alert_core::config::NotificationsConfig;
use alert_core::{Alert, Severity};

use crate::error::NotifyError;
use crate::traits::RenderedAlert;

/// Variables exposed to `alert_message` and `slack_alert_title` templates,
/// matching the fixed set the engine documents for rule authors.
#[derive(Debug, Clone, serde::Serialize)]
struct TemplateVars {
    rule_name: String,
    service: String,
    namespace: String,
    level: String,
    count: u64,
    time_window: String,
    message: String,
    pod: String,
    severity: String,
    severity_emoji: String,
}

/// Renders alert templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        minijinja::Environment::new()
    }

    /// Checks that both configured templates parse, without evaluating them.
    /// Called once at startup so a typo in `alert_message` is caught before
    /// the first alert ever needs to render.
    pub fn validate_templates(&self, cfg: &NotificationsConfig) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(&cfg.templates.alert_message)
            .map_err(|e| NotifyError::Template(format!("alert_message: {e}")))?;
        env.template_from_str(&cfg.templates.slack_alert_title)
            .map_err(|e| NotifyError::Template(format!("slack_alert_title: {e}")))?;
        Ok(())
    }

    /// Render `alert` into a channel-agnostic [`RenderedAlert`].
    ///
    /// `count` and `time_window_secs` come from the evaluator's threshold
    /// check rather than from `alert` itself, since the alert may be a
    /// construction-time snapshot taken before the final count was known.
    pub fn render(
        &self,
        alert: &Alert,
        rule_name: &str,
        count: u64,
        time_window_secs: u64,
        cfg: &NotificationsConfig,
    ) -> Result<RenderedAlert, NotifyError> {
        let severity_key = alert.severity.as_str();
        let severity_emoji = cfg
            .severity
            .emojis
            .get(severity_key)
            .or_else(|| cfg.severity.emojis.get(Severity::Default.as_str()))
            .cloned()
            .unwrap_or_default();
        let severity_color = cfg
            .severity
            .colors
            .get(severity_key)
            .or_else(|| cfg.severity.colors.get(Severity::Default.as_str()))
            .cloned()
            .unwrap_or_default();

        let vars = TemplateVars {
            rule_name: rule_name.to_string(),
            service: alert.log_entry.service.clone(),
            namespace: alert.log_entry.namespace.clone(),
            level: alert.log_entry.level.clone(),
            count,
            time_window: humanize_duration(time_window_secs),
            message: alert.log_entry.message.clone(),
            pod: alert.log_entry.pod.clone(),
            severity: severity_key.to_string(),
            severity_emoji,
        };

        let env = Self::build_env();
        let text = env
            .render_str(&cfg.templates.alert_message, &vars)
            .map_err(|e| NotifyError::Template(format!("alert_message: {e}")))?;
        let title = env
            .render_str(&cfg.templates.slack_alert_title, &vars)
            .map_err(|e| NotifyError::Template(format!("slack_alert_title: {e}")))?;

        Ok(RenderedAlert {
            title,
            text,
            severity_color,
        })
    }
}

/// `90s` / `5m` / `2h` — whichever unit divides evenly, preferring the
/// largest. Falls back to seconds.
fn humanize_duration(secs: u64) -> String {
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::config::Config;
    use alert_core::{DeliveryStatus, LogEntry};
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_alert() -> Alert {
        Alert {
            id: "r1-1".into(),
            rule_id: "r1".into(),
            rule_name: "Error spike".into(),
            log_entry: LogEntry {
                timestamp: Utc::now(),
                level: "ERROR".into(),
                message: "database connection refused".into(),
                service: "user-service".into(),
                namespace: "prod".into(),
                pod: "user-service-7d8".into(),
                container: String::new(),
                host: String::new(),
                labels: HashMap::new(),
                raw: String::new(),
            },
            timestamp: Utc::now(),
            severity: Severity::High,
            status: DeliveryStatus::Pending,
            count: 3,
            message: String::new(),
            channel: String::new(),
            webhook: None,
        }
    }

    #[test]
    fn humanize_duration_picks_largest_unit() {
        assert_eq!(humanize_duration(90), "90s");
        assert_eq!(humanize_duration(120), "2m");
        assert_eq!(humanize_duration(7200), "2h");
        assert_eq!(humanize_duration(0), "0s");
    }

    #[test]
    fn render_substitutes_all_variables() {
        let renderer = TemplateRenderer::new();
        let cfg = Config::for_profile("").notifications;
        let alert = sample_alert();
        let rendered = renderer.render(&alert, "Error spike", 3, 120, &cfg).unwrap();
        assert!(rendered.text.contains("Error spike"));
        assert!(rendered.text.contains("user-service"));
        assert!(rendered.text.contains("prod"));
        assert!(rendered.text.contains("2m"));
        assert!(rendered.text.contains("database connection refused"));
        assert!(rendered.title.contains("Error spike"));
        assert_eq!(rendered.severity_color, "#f57c00");
    }

    #[test]
    fn render_falls_back_to_default_severity_emoji_when_missing() {
        let renderer = TemplateRenderer::new();
        let mut cfg = Config::for_profile("").notifications;
        cfg.severity.emojis.remove("high");
        let alert = sample_alert();
        let rendered = renderer.render(&alert, "Error spike", 3, 60, &cfg).unwrap();
        assert!(rendered.title.contains("\u{1f4cb}"));
    }

    #[test]
    fn validate_templates_accepts_defaults() {
        let renderer = TemplateRenderer::new();
        let cfg = Config::for_profile("").notifications;
        assert!(renderer.validate_templates(&cfg).is_ok());
    }

    #[test]
    fn validate_templates_rejects_broken_syntax() {
        let renderer = TemplateRenderer::new();
        let mut cfg = Config::for_profile("").notifications;
        cfg.templates.alert_message = "{{ unclosed".to_string();
        assert!(renderer.validate_templates(&cfg).is_err());
    }
}
