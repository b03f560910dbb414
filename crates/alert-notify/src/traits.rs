//! Notifier trait and the rendered-payload type it consumes.

use alert_core::Alert;

use crate::error::NotifyError;

/// Output of the templating stage, channel-agnostic. A webhook adapter maps
/// this onto its wire payload; a future channel (email, Telegram) would do
/// the same without the `Dispatcher` or templating stage changing.
#[derive(Debug, Clone)]
pub struct RenderedAlert {
    pub title: String,
    pub text: String,
    pub severity_color: String,
}

/// Pluggable notification channel. Reference implementation is
/// [`crate::webhook::WebhookNotifier`].
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a single rendered alert (or, when batched, one alert already
    /// carrying the batch's combined text). Returns a typed error so the
    /// `Dispatcher`'s retry stage can tell retryable failures from terminal
    /// ones.
    async fn send_alert(&self, alert: &Alert, rendered: &RenderedAlert) -> Result<(), NotifyError>;

    /// Deliver a coalesced batch as a single request where the channel
    /// supports it. The default falls back to one `send_alert` call per
    /// item, so a channel that never overrides this still works — it just
    /// doesn't get the "one request per batch" benefit.
    async fn send_batch(&self, items: &[(Alert, RenderedAlert)]) -> Result<(), NotifyError> {
        for (alert, rendered) in items {
            self.send_alert(alert, rendered).await?;
        }
        Ok(())
    }

    /// Optional startup probe; the reference webhook adapter sends a test
    /// payload to the configured URL.
    async fn test_connection(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    fn channel_name(&self) -> &str;
}
