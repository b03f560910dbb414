//! Dedup → rate-limit → render → send-with-retry → optional-batch pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alert_bus::MicroBatcher;
use canon::canonicalize_message;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use alert_core::config::NotificationsConfig;
use alert_core::Alert;

use crate::error::NotifyError;
use crate::templating::TemplateRenderer;
use crate::traits::{Notifier, RenderedAlert};

mod canon {
    // Message canonicalization used by the deduplication hash key. A fresh
    // Regex per call would dominate dispatch latency, so these are built
    // once and reused; the patterns are fixed, so `expect` here can never
    // fire at runtime.
    use std::sync::OnceLock;

    fn uuid_re() -> &'static regex::Regex {
        static RE: OnceLock<regex::Regex> = OnceLock::new();
        RE.get_or_init(|| {
            regex::Regex::new(
                r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
            )
            .expect("static uuid pattern is valid")
        })
    }

    fn timestamp_re() -> &'static regex::Regex {
        static RE: OnceLock<regex::Regex> = OnceLock::new();
        RE.get_or_init(|| {
            regex::Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?")
                .expect("static timestamp pattern is valid")
        })
    }

    fn integer_re() -> &'static regex::Regex {
        static RE: OnceLock<regex::Regex> = OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r"\b\d+\b").expect("static integer pattern is valid"))
    }

    /// Strip UUIDs, RFC3339 timestamps, and bare integers from `message`,
    /// replacing each with a placeholder token, so that two otherwise
    /// identical log lines differing only by request id or timestamp hash to
    /// the same deduplication key. Order matters: timestamps contain digits
    /// that the integer pass would otherwise mangle, so timestamps are
    /// replaced first.
    pub fn canonicalize_message(message: &str) -> String {
        let step1 = uuid_re().replace_all(message, "<id>");
        let step2 = timestamp_re().replace_all(&step1, "<ts>");
        integer_re().replace_all(&step2, "<num>").into_owned()
    }
}

/// In-process token bucket shared across all rules, per §4.B stage 2.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_minute: u32) -> Self {
        let capacity = per_minute.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// One alert queued for the batch-send path, carrying everything
/// [`TemplateRenderer::render`] needs plus a channel back to the `dispatch`
/// call that queued it.
struct PendingAlert {
    alert: Alert,
    rule_name: String,
    count: u64,
    window_secs: u64,
    respond_to: oneshot::Sender<Result<DispatchOutcome, NotifyError>>,
}

/// Coordinates deduplication, rate limiting, rendering, and retrying
/// delivery of alerts through a single [`Notifier`].
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    renderer: TemplateRenderer,
    cfg: NotificationsConfig,
    dedup_seen: Mutex<HashMap<u64, Instant>>,
    bucket: Mutex<TokenBucket>,
    /// `Some` when `batch_size > 1`: alerts are coalesced here and flushed
    /// by size (on push) or by time (via [`Self::run_batch_flush_loop`])
    /// instead of sent one at a time.
    batch: Option<Mutex<MicroBatcher<PendingAlert>>>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, cfg: NotificationsConfig) -> Self {
        let bucket = TokenBucket::new(cfg.rate_limit_per_min);
        let batch = (cfg.batch_size > 1).then(|| {
            Mutex::new(MicroBatcher::new(
                cfg.batch_size as usize,
                Duration::from_millis(cfg.batch_delay_ms.max(1)),
            ))
        });
        Self {
            notifier,
            renderer: TemplateRenderer::new(),
            cfg,
            dedup_seen: Mutex::new(HashMap::new()),
            bucket: Mutex::new(bucket),
            batch,
        }
    }

    fn dedup_key(rule_id: &str, entry: &alert_core::LogEntry) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        rule_id.hash(&mut hasher);
        entry.service.hash(&mut hasher);
        entry.namespace.hash(&mut hasher);
        entry.level.hash(&mut hasher);
        canonicalize_message(&entry.message).hash(&mut hasher);
        hasher.finish()
    }

    /// `true` if an alert with the same dedup key was seen within the
    /// configured window; records the key either way so repeated calls
    /// within the window keep returning `true` until it expires.
    fn is_duplicate(&self, alert: &Alert) -> bool {
        if !self.cfg.enable_deduplication {
            return false;
        }
        let key = Self::dedup_key(&alert.rule_id, &alert.log_entry);
        let window = Duration::from_secs(self.cfg.deduplication_window_secs);
        let mut seen = self.dedup_seen.lock().unwrap();
        seen.retain(|_, at| at.elapsed() < window);
        if seen.contains_key(&key) {
            return true;
        }
        seen.insert(key, Instant::now());
        false
    }

    async fn acquire_token(&self) -> Result<(), NotifyError> {
        let deadline = Instant::now() + Duration::from_millis(self.cfg.timeout_ms);
        loop {
            if self.bucket.lock().unwrap().try_take() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(NotifyError::RateLimited {
                    retry_after_secs: None,
                });
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Send with exponential backoff, honoring a server-supplied
    /// `Retry-After` when present. Non-retryable errors (client errors)
    /// return immediately.
    async fn send_with_retry(
        &self,
        send: impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), NotifyError>> + Send>>,
    ) -> Result<(), NotifyError> {
        let mut attempt = 0u32;
        let base = Duration::from_millis(self.cfg.retry_delay_ms);
        loop {
            match send().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.cfg.max_retries && e.is_retryable() => {
                    let delay = e
                        .retry_after_secs()
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| base * 2u32.pow(attempt));
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "notification delivery failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run the full pipeline for one alert: dedup, rate-limit, render, send
    /// with retry. Returns `Ok(())` both when delivered and when suppressed
    /// by deduplication — the caller only needs to know whether it should
    /// treat the alert as `sent` vs `failed`, and a suppressed alert is
    /// neither; callers that care should check `was_duplicate` separately.
    ///
    /// When batching is configured (`batch_size > 1`), the alert is queued
    /// and this call suspends until the batch it lands in is actually sent —
    /// either because this push filled the batch, or because
    /// [`Self::run_batch_flush_loop`] flushed it on the time bound.
    pub async fn dispatch(
        &self,
        alert: &Alert,
        rule_name: &str,
        count: u64,
        window_secs: u64,
    ) -> Result<DispatchOutcome, NotifyError> {
        if self.is_duplicate(alert) {
            return Ok(DispatchOutcome::Suppressed);
        }

        let Some(batch) = &self.batch else {
            return self.send_one(alert, rule_name, count, window_secs).await;
        };

        let (respond_to, response) = oneshot::channel();
        let ready = {
            let mut b = batch.lock().unwrap();
            b.push(PendingAlert {
                alert: alert.clone(),
                rule_name: rule_name.to_string(),
                count,
                window_secs,
                respond_to,
            });
            b.try_flush()
        };

        if let Some(items) = ready {
            self.flush_batch_now(items).await;
        }

        response
            .await
            .unwrap_or_else(|_| Err(NotifyError::Config("batch dispatcher dropped without responding".into())))
    }

    async fn send_one(
        &self,
        alert: &Alert,
        rule_name: &str,
        count: u64,
        window_secs: u64,
    ) -> Result<DispatchOutcome, NotifyError> {
        self.acquire_token().await?;

        let rendered = self
            .renderer
            .render(alert, rule_name, count, window_secs, &self.cfg)?;

        let notifier = Arc::clone(&self.notifier);
        let alert_owned = alert.clone();
        let rendered_owned = rendered.clone();
        self.send_with_retry(move || {
            let notifier = Arc::clone(&notifier);
            let alert = alert_owned.clone();
            let rendered = rendered_owned.clone();
            Box::pin(async move { notifier.send_alert(&alert, &rendered).await })
        })
        .await?;

        Ok(DispatchOutcome::Sent)
    }

    /// Render and deliver one already-flushed batch as a single request,
    /// then notify every queued `dispatch` call of the outcome. A render
    /// failure only drops its own item; the rest of the batch still goes out.
    async fn flush_batch_now(&self, items: Vec<PendingAlert>) {
        if items.is_empty() {
            return;
        }

        let mut rendered = Vec::with_capacity(items.len());
        let mut responders = Vec::with_capacity(items.len());
        for item in items {
            match self
                .renderer
                .render(&item.alert, &item.rule_name, item.count, item.window_secs, &self.cfg)
            {
                Ok(r) => {
                    rendered.push((item.alert, r));
                    responders.push(item.respond_to);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to render batched alert, dropping from batch");
                    let _ = item.respond_to.send(Err(e));
                }
            }
        }

        if responders.is_empty() {
            return;
        }

        if let Err(e) = self.acquire_token().await {
            for tx in responders {
                let _ = tx.send(Err(e.for_broadcast()));
            }
            return;
        }

        let notifier = Arc::clone(&self.notifier);
        let batch = rendered;
        let result = self
            .send_with_retry(move || {
                let notifier = Arc::clone(&notifier);
                let batch = batch.clone();
                Box::pin(async move { notifier.send_batch(&batch).await })
            })
            .await;

        for tx in responders {
            let outcome = match &result {
                Ok(()) => Ok(DispatchOutcome::Sent),
                Err(e) => Err(e.for_broadcast()),
            };
            let _ = tx.send(outcome);
        }
    }

    /// Time-bound flush for batches that never reach `batch_size`. A no-op
    /// when batching isn't configured; runs until `cancel` fires.
    pub async fn run_batch_flush_loop(&self, cancel: CancellationToken) {
        let Some(batch) = &self.batch else {
            return;
        };
        let mut ticker = tokio::time::interval(Duration::from_millis(self.cfg.batch_delay_ms.max(10)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let items = batch.lock().unwrap().try_flush();
                    if let Some(items) = items {
                        self.flush_batch_now(items).await;
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Suppressed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::config::Config;
    use alert_core::{DeliveryStatus, LogEntry, Severity};
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_alert(message: &str) -> Alert {
        Alert {
            id: "r1-1".into(),
            rule_id: "r1".into(),
            rule_name: "Error spike".into(),
            log_entry: LogEntry {
                timestamp: Utc::now(),
                level: "ERROR".into(),
                message: message.to_string(),
                service: "svc".into(),
                namespace: "prod".into(),
                pod: String::new(),
                container: String::new(),
                host: String::new(),
                labels: StdHashMap::new(),
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

    struct CountingNotifier {
        calls: Arc<AtomicUsize>,
        fail_first_n: usize,
    }

    #[async_trait::async_trait]
    impl Notifier for CountingNotifier {
        async fn send_alert(&self, _alert: &Alert, _rendered: &RenderedAlert) -> Result<(), NotifyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(NotifyError::ServerError {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(())
            }
        }

        fn channel_name(&self) -> &str {
            "mock"
        }
    }

    fn test_cfg() -> NotificationsConfig {
        let mut cfg = Config::for_profile("").notifications;
        cfg.retry_delay_ms = 1;
        cfg.timeout_ms = 2_000;
        cfg
    }

    #[test]
    fn canonicalize_strips_uuid_timestamp_and_integers() {
        let a = canonicalize_message("request abc12345-1111-2222-3333-444455556666 failed at 2025-01-01T00:00:00Z after 3 retries");
        let b = canonicalize_message("request deadbeef-1111-2222-3333-444455556666 failed at 2025-06-01T12:30:00Z after 7 retries");
        assert_eq!(a, b);
        assert!(a.contains("<id>"));
        assert!(a.contains("<ts>"));
        assert!(a.contains("<num>"));
    }

    #[tokio::test]
    async fn dispatch_suppresses_duplicate_within_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(CountingNotifier {
            calls: calls.clone(),
            fail_first_n: 0,
        });
        let dispatcher = Dispatcher::new(notifier, test_cfg());

        let a1 = sample_alert("db timeout for request 12345");
        let a2 = sample_alert("db timeout for request 67890");

        let r1 = dispatcher.dispatch(&a1, "rule", 2, 60).await.unwrap();
        let r2 = dispatcher.dispatch(&a2, "rule", 2, 60).await.unwrap();

        assert_eq!(r1, DispatchOutcome::Sent);
        assert_eq!(r2, DispatchOutcome::Suppressed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_retries_on_server_error_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(CountingNotifier {
            calls: calls.clone(),
            fail_first_n: 2,
        });
        let dispatcher = Dispatcher::new(notifier, test_cfg());

        let alert = sample_alert("unique message one");
        let outcome = dispatcher.dispatch(&alert, "rule", 2, 60).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatch_batches_and_sends_together_once_size_reached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(CountingNotifier {
            calls: calls.clone(),
            fail_first_n: 0,
        });
        let mut cfg = test_cfg();
        cfg.batch_size = 2;
        cfg.batch_delay_ms = 60_000;
        let dispatcher = Dispatcher::new(notifier, cfg);

        let a1 = sample_alert("conn refused 1");
        let a2 = sample_alert("conn refused 2");

        let (r1, r2) = tokio::join!(
            dispatcher.dispatch(&a1, "rule", 2, 60),
            dispatcher.dispatch(&a2, "rule", 2, 60)
        );

        assert_eq!(r1.unwrap(), DispatchOutcome::Sent);
        assert_eq!(r2.unwrap(), DispatchOutcome::Sent);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_batch_flush_loop_flushes_on_time_bound() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(CountingNotifier {
            calls: calls.clone(),
            fail_first_n: 0,
        });
        let mut cfg = test_cfg();
        cfg.batch_size = 10;
        cfg.batch_delay_ms = 20;
        let dispatcher = Arc::new(Dispatcher::new(notifier, cfg));

        let cancel = CancellationToken::new();
        let flush_handle = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run_batch_flush_loop(cancel).await })
        };

        let alert = sample_alert("solo alert never reaches batch_size");
        let outcome = dispatcher.dispatch(&alert, "rule", 1, 60).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cancel.cancel();
        flush_handle.await.unwrap();
    }

    #[tokio::test]
    async fn no_batching_when_batch_size_is_one() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(CountingNotifier {
            calls: calls.clone(),
            fail_first_n: 0,
        });
        let dispatcher = Dispatcher::new(notifier, test_cfg());
        let alert = sample_alert("unbatched alert");
        let outcome = dispatcher.dispatch(&alert, "rule", 1, 60).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
