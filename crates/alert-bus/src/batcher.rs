//! Micro-batch accumulator, generalized from the queue-message-specific
//! version to any item type so it can back both the batch log consumer here
//! and the notifier's alert batching.
//!
//! Flushes when either the size threshold or time window is reached,
//! whichever comes first. This balances throughput (larger batches) with
//! latency (time-bounded delivery).

use std::time::{Duration, Instant};

pub struct MicroBatcher<T> {
    buffer: Vec<T>,
    max_size: usize,
    max_wait: Duration,
    batch_started: Option<Instant>,
}

impl<T> MicroBatcher<T> {
    /// - `max_size`: flush when this many items are buffered.
    /// - `max_wait`: flush when this duration has elapsed since the first
    ///   item in the current batch was pushed.
    pub fn new(max_size: usize, max_wait: Duration) -> Self {
        Self {
            buffer: Vec::with_capacity(max_size),
            max_size,
            max_wait,
            batch_started: None,
        }
    }

    /// Add one item. Starts the batch timer on the first push into an empty
    /// buffer.
    pub fn push(&mut self, item: T) {
        if self.batch_started.is_none() {
            self.batch_started = Some(Instant::now());
        }
        self.buffer.push(item);
    }

    pub fn should_flush(&self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        if self.buffer.len() >= self.max_size {
            return true;
        }
        if let Some(started) = self.batch_started {
            if started.elapsed() >= self.max_wait {
                return true;
            }
        }
        false
    }

    /// Flush unconditionally, resetting the batcher for the next batch.
    pub fn flush(&mut self) -> Vec<T> {
        self.batch_started = None;
        std::mem::take(&mut self.buffer)
    }

    pub fn try_flush(&mut self) -> Option<Vec<T>> {
        if self.should_flush() {
            Some(self.flush())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_on_size() {
        let mut batcher = MicroBatcher::new(3, Duration::from_secs(60));
        batcher.push(1);
        batcher.push(2);
        batcher.push(3);
        assert!(batcher.should_flush());
    }

    #[test]
    fn no_flush_below_size() {
        let mut batcher = MicroBatcher::new(5, Duration::from_secs(60));
        batcher.push(1);
        batcher.push(2);
        assert!(!batcher.should_flush());
    }

    #[test]
    fn flush_on_timeout() {
        let mut batcher = MicroBatcher::new(100, Duration::from_millis(10));
        batcher.push(1);
        std::thread::sleep(Duration::from_millis(20));
        assert!(batcher.should_flush());
    }

    #[test]
    fn flush_resets_state() {
        let mut batcher = MicroBatcher::new(2, Duration::from_secs(60));
        batcher.push(1);
        batcher.push(2);
        batcher.push(3);
        let flushed = batcher.flush();
        assert_eq!(flushed.len(), 3);
        assert_eq!(batcher.len(), 0);
        assert!(batcher.is_empty());
        assert!(!batcher.should_flush());
    }

    #[test]
    fn try_flush_none_until_ready() {
        let mut batcher = MicroBatcher::new(2, Duration::from_secs(60));
        batcher.push("a");
        assert!(batcher.try_flush().is_none());
        batcher.push("b");
        let batch = batcher.try_flush();
        assert_eq!(batch, Some(vec!["a", "b"]));
    }
}
