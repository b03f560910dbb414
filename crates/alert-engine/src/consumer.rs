//! Bus consumer: parses, validates, evaluates, and acknowledges one log
//! message at a time, with an optional micro-batched front end for
//! higher-throughput sources.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use alert_bus::{parse_envelope, validate_and_default, BusAdapter, BusError, MicroBatcher};
use alert_core::config::LogProcessingConfig;
use alert_core::LogStats;

use crate::engine::AlertEngine;
use crate::error::EngineError;

/// Log stats are persisted every this-many processed records rather than on
/// every single one, matching `LogProcessingConfig::flush_interval_ms`'s
/// time-or-size tradeoff but on a simple record count.
const STATS_FLUSH_EVERY: u64 = 100;

#[derive(Default)]
pub struct ConsumerMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
    total_processing_us: AtomicU64,
    last_processed_unix: AtomicI64,
}

impl ConsumerMetrics {
    fn record_success(&self, elapsed: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.last_processed_unix
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn messages_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn error_rate(&self) -> f64 {
        let processed = self.messages_processed();
        let failed = self.messages_failed();
        let total = processed + failed;
        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }

    pub fn avg_processing_micros(&self) -> u64 {
        let processed = self.messages_processed();
        if processed == 0 {
            0
        } else {
            self.total_processing_us.load(Ordering::Relaxed) / processed
        }
    }

    /// Unhealthy when the error rate exceeds 10% or nothing has been
    /// processed in the last 5 minutes (and at least one message has ever
    /// been processed, so a freshly started consumer isn't flagged).
    pub fn is_healthy(&self) -> bool {
        if self.error_rate() > 0.10 {
            return false;
        }
        let last = self.last_processed_unix.load(Ordering::Relaxed);
        if last == 0 {
            return true;
        }
        chrono::Utc::now().timestamp() - last < 300
    }
}

pub struct LogConsumer {
    bus: Arc<dyn BusAdapter>,
    engine: Arc<AlertEngine>,
    log_cfg: LogProcessingConfig,
    stats: tokio::sync::Mutex<LogStats>,
    stats_since_flush: AtomicU64,
    pub metrics: ConsumerMetrics,
}

impl LogConsumer {
    pub fn new(bus: Arc<dyn BusAdapter>, engine: Arc<AlertEngine>, log_cfg: LogProcessingConfig) -> Self {
        Self {
            bus,
            engine,
            log_cfg,
            stats: tokio::sync::Mutex::new(LogStats::default()),
            stats_since_flush: AtomicU64::new(0),
            metrics: ConsumerMetrics::default(),
        }
    }

    /// Parse, validate, and evaluate one message body. Does not touch the
    /// bus; callers are responsible for acknowledgement.
    async fn process_one(&self, body: &[u8]) -> Result<(), EngineError> {
        let entry = parse_envelope(body)?;
        let entry = validate_and_default(entry, &self.log_cfg)?;

        self.engine.evaluate_log(&entry).await;

        let mut stats = self.stats.lock().await;
        stats.record(&entry);
        if self.stats_since_flush.fetch_add(1, Ordering::Relaxed) + 1 >= STATS_FLUSH_EVERY {
            self.stats_since_flush.store(0, Ordering::Relaxed);
            if let Err(e) = self.engine_store_log_stats(&stats).await {
                warn!(error = %e, "failed to persist log stats");
            }
        }

        Ok(())
    }

    async fn engine_store_log_stats(&self, stats: &LogStats) -> Result<(), EngineError> {
        self.engine.persist_log_stats(stats).await
    }

    /// Single-message consume loop. Runs until `cancel` fires or the bus
    /// adapter reports it has been cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.bus.read_message(&cancel).await {
                Ok(msg) => {
                    let start = Instant::now();
                    match self.process_one(&msg.body).await {
                        Ok(()) => {
                            self.metrics.record_success(start.elapsed());
                        }
                        Err(e) => {
                            warn!(error = %e, message_id = %msg.id, "failed to process log message, skipping");
                            self.metrics.record_failure();
                        }
                    }
                    if let Err(e) = self.bus.ack(&msg.id).await {
                        warn!(error = %e, message_id = %msg.id, "failed to ack message");
                    }
                }
                Err(BusError::Cancelled) => return,
                Err(e) => {
                    warn!(error = %e, "bus read failed");
                    self.metrics.record_failure();
                }
            }
        }
    }

    /// Micro-batched consume loop: accumulates messages up to
    /// `log_cfg.batch_size` / `log_cfg.flush_interval_ms`, then processes and
    /// acknowledges each buffered message through the identical single-message
    /// path in [`Self::process_one`] — batching only changes how messages are
    /// grouped for acknowledgement, never the evaluation semantics.
    pub async fn run_batched(&self, cancel: CancellationToken) {
        let mut batcher = MicroBatcher::new(
            self.log_cfg.batch_size as usize,
            Duration::from_millis(self.log_cfg.flush_interval_ms),
        );

        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.bus.read_message(&cancel).await {
                Ok(msg) => batcher.push(msg),
                Err(BusError::Cancelled) => {
                    self.flush_batch(&mut batcher).await;
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "bus read failed");
                    self.metrics.record_failure();
                }
            }

            if batcher.should_flush() {
                self.flush_batch(&mut batcher).await;
            }
        }
    }

    async fn flush_batch(&self, batcher: &mut MicroBatcher<alert_bus::BusMessage>) {
        let batch = batcher.flush();
        if batch.is_empty() {
            return;
        }
        debug!(size = batch.len(), "flushing log batch");
        for msg in batch {
            let start = Instant::now();
            match self.process_one(&msg.body).await {
                Ok(()) => self.metrics.record_success(start.elapsed()),
                Err(e) => {
                    warn!(error = %e, message_id = %msg.id, "failed to process batched log message, skipping");
                    self.metrics.record_failure();
                }
            }
            if let Err(e) = self.bus.ack(&msg.id).await {
                warn!(error = %e, message_id = %msg.id, "failed to ack batched message");
            }
        }
    }
}
