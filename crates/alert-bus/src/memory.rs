//! In-memory bus adapter: a channel-backed queue for tests and
//! single-process deployments with no external broker.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::adapter::{BusAdapter, BusHealth, BusMessage};
use crate::error::BusError;

pub struct InMemoryBusAdapter {
    inbox: Mutex<tokio::sync::mpsc::UnboundedReceiver<BusMessage>>,
    sender: tokio::sync::mpsc::UnboundedSender<BusMessage>,
}

impl InMemoryBusAdapter {
    pub fn new() -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        Self {
            inbox: Mutex::new(receiver),
            sender,
        }
    }

    /// Enqueue a raw body as a message with an auto-generated id; used by
    /// tests and any in-process producer.
    pub fn publish(&self, body: Vec<u8>) {
        let id = uuid::Uuid::new_v4().to_string();
        let _ = self.sender.send(BusMessage {
            id,
            body,
            timestamp: Utc::now(),
            attempt_count: 1,
        });
    }
}

impl Default for InMemoryBusAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusAdapter for InMemoryBusAdapter {
    async fn read_message(&self, cancel: &CancellationToken) -> Result<BusMessage, BusError> {
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            msg = inbox.recv() => msg.ok_or_else(|| BusError::Connection("channel closed".into())),
            _ = cancel.cancelled() => Err(BusError::Cancelled),
        }
    }

    async fn ack(&self, _message_id: &str) -> Result<(), BusError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<BusHealth, BusError> {
        Ok(BusHealth {
            connected: true,
            provider: "memory".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_read_round_trips() {
        let adapter = InMemoryBusAdapter::new();
        adapter.publish(b"hello".to_vec());
        let cancel = CancellationToken::new();
        let msg = adapter.read_message(&cancel).await.unwrap();
        assert_eq!(msg.body, b"hello");
    }

    #[tokio::test]
    async fn cancellation_interrupts_read() {
        let adapter = InMemoryBusAdapter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = adapter.read_message(&cancel).await.unwrap_err();
        assert!(matches!(err, BusError::Cancelled));
    }
}
