//! Slack-compatible HTTP webhook notifier.
//!
//! Delivers alerts as the `attachments`-shaped JSON payload Slack incoming
//! webhooks (and compatible sinks) expect.

use serde::Serialize;

use alert_core::Alert;

use crate::error::NotifyError;
use crate::traits::{Notifier, RenderedAlert};

#[derive(Debug, Serialize)]
struct SlackPayload {
    text: String,
    username: String,
    icon_emoji: String,
    channel: String,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    fields: Vec<SlackField>,
    text: String,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

/// POSTs a Slack-shaped JSON payload to a configured webhook URL.
pub struct WebhookNotifier {
    url: String,
    username: String,
    icon_emoji: String,
    default_channel: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, username: String, icon_emoji: String, default_channel: String) -> Self {
        Self {
            url,
            username,
            icon_emoji,
            default_channel,
            client: reqwest::Client::new(),
        }
    }

    /// `rule.actions.channel`, falling back to the notifier's configured
    /// default when the rule left it unset.
    fn channel_for(&self, alert: &Alert) -> String {
        if alert.channel.is_empty() {
            self.default_channel.clone()
        } else {
            alert.channel.clone()
        }
    }

    /// `rule.actions.webhook`, falling back to the notifier's configured URL
    /// when the rule left it unset.
    fn target_url<'a>(&'a self, alert: &'a Alert) -> &'a str {
        alert.webhook.as_deref().unwrap_or(&self.url)
    }

    fn build_payload(&self, alert: &Alert, rendered: &RenderedAlert) -> SlackPayload {
        let channel = self.channel_for(alert);

        SlackPayload {
            text: rendered.title.clone(),
            username: self.username.clone(),
            icon_emoji: self.icon_emoji.clone(),
            channel,
            attachments: vec![SlackAttachment {
                color: rendered.severity_color.clone(),
                title: rendered.title.clone(),
                fields: vec![
                    SlackField {
                        title: "Service".to_string(),
                        value: alert.log_entry.service.clone(),
                        short: true,
                    },
                    SlackField {
                        title: "Namespace".to_string(),
                        value: alert.log_entry.namespace.clone(),
                        short: true,
                    },
                    SlackField {
                        title: "Count".to_string(),
                        value: alert.count.to_string(),
                        short: true,
                    },
                    SlackField {
                        title: "Severity".to_string(),
                        value: alert.severity.as_str().to_string(),
                        short: true,
                    },
                ],
                text: rendered.text.clone(),
            }],
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send_alert(&self, alert: &Alert, rendered: &RenderedAlert) -> Result<(), NotifyError> {
        let payload = self.build_payload(alert, rendered);

        let response = self
            .client
            .post(self.target_url(alert))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(alert_id = %alert.id, %status, "alert delivered");
            return Ok(());
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();

        if code == 429 {
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status.is_server_error() {
            return Err(NotifyError::ServerError { status: code, body });
        }
        Err(NotifyError::ClientError { status: code, body })
    }

    async fn send_batch(&self, items: &[(Alert, RenderedAlert)]) -> Result<(), NotifyError> {
        let Some((first_alert, _)) = items.first() else {
            return Ok(());
        };
        let channel = self.channel_for(first_alert);
        let target_url = self.target_url(first_alert).to_string();

        let attachments = items
            .iter()
            .map(|(alert, rendered)| SlackAttachment {
                color: rendered.severity_color.clone(),
                title: rendered.title.clone(),
                fields: vec![
                    SlackField {
                        title: "Service".to_string(),
                        value: alert.log_entry.service.clone(),
                        short: true,
                    },
                    SlackField {
                        title: "Count".to_string(),
                        value: alert.count.to_string(),
                        short: true,
                    },
                ],
                text: rendered.text.clone(),
            })
            .collect();

        let payload = SlackPayload {
            text: format!("{} alerts fired", items.len()),
            username: self.username.clone(),
            icon_emoji: self.icon_emoji.clone(),
            channel,
            attachments,
        };

        let response = self
            .client
            .post(&target_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(batch_size = items.len(), %status, "alert batch delivered");
            return Ok(());
        }
        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        if code == 429 {
            return Err(NotifyError::RateLimited {
                retry_after_secs: None,
            });
        }
        if status.is_server_error() {
            return Err(NotifyError::ServerError { status: code, body });
        }
        Err(NotifyError::ClientError { status: code, body })
    }

    async fn test_connection(&self) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": "alert engine connectivity check" }))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::ServerError {
                status: response.status().as_u16(),
                body: "test_connection failed".to_string(),
            })
        }
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::{DeliveryStatus, LogEntry, Severity};
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
                message: "boom".into(),
                service: "svc".into(),
                namespace: "prod".into(),
                pod: String::new(),
                container: String::new(),
                host: String::new(),
                labels: HashMap::new(),
                raw: String::new(),
            },
            timestamp: Utc::now(),
            severity: Severity::High,
            status: DeliveryStatus::Pending,
            count: 2,
            message: String::new(),
            channel: String::new(),
            webhook: None,
        }
    }

    #[test]
    fn build_payload_uses_default_channel_when_unset() {
        let notifier = WebhookNotifier::new(
            "https://example.com/hook".into(),
            "alert-engine".into(),
            ":rotating_light:".into(),
            "#alerts".into(),
        );
        let rendered = RenderedAlert {
            title: "title".into(),
            text: "text".into(),
            severity_color: "#f57c00".into(),
        };
        let payload = notifier.build_payload(&sample_alert(), &rendered);
        assert_eq!(payload.channel, "#alerts");
        assert_eq!(payload.attachments.len(), 1);
        assert_eq!(payload.attachments[0].fields.len(), 4);
    }

    #[test]
    fn build_payload_honors_per_rule_channel_override() {
        let notifier = WebhookNotifier::new(
            "https://example.com/hook".into(),
            "alert-engine".into(),
            ":rotating_light:".into(),
            "#alerts".into(),
        );
        let mut alert = sample_alert();
        alert.channel = "#incidents".to_string();
        let rendered = RenderedAlert {
            title: "title".into(),
            text: "text".into(),
            severity_color: "#f57c00".into(),
        };
        let payload = notifier.build_payload(&alert, &rendered);
        assert_eq!(payload.channel, "#incidents");
    }

    #[test]
    fn target_url_honors_per_rule_webhook_override() {
        let notifier = WebhookNotifier::new(
            "https://example.com/hook".into(),
            "alert-engine".into(),
            ":rotating_light:".into(),
            "#alerts".into(),
        );
        let mut alert = sample_alert();
        alert.webhook = Some("https://example.com/other-hook".to_string());
        assert_eq!(notifier.target_url(&alert), "https://example.com/other-hook");

        let default_alert = sample_alert();
        assert_eq!(notifier.target_url(&default_alert), "https://example.com/hook");
    }

    #[test]
    fn channel_name_is_webhook() {
        let notifier = WebhookNotifier::new(String::new(), String::new(), String::new(), String::new());
        assert_eq!(notifier.channel_name(), "webhook");
    }
}
