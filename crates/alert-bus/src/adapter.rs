//! Bus adapter trait and the raw message type it produces.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::BusError;

/// A raw message read from the bus, before envelope unwrapping.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Provider-assigned id, used for acknowledgement.
    pub id: String,
    /// Raw message body.
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// Number of times this message has been delivered (retry tracking).
    pub attempt_count: u32,
}

/// Connectivity status of a [`BusAdapter`].
#[derive(Debug, Clone)]
pub struct BusHealth {
    pub connected: bool,
    pub provider: String,
}

/// Trait for message-bus consumer backends (Kafka/Redpanda-shaped brokers,
/// Redis Streams, SQS — anything that hands back one message at a time with
/// consumer-group offset tracking owned by the adapter).
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Read the next message, honoring `cancel` as a suspension point.
    /// Returns `Err(BusError::Cancelled)` if cancelled before a message
    /// arrives.
    async fn read_message(&self, cancel: &CancellationToken) -> Result<BusMessage, BusError>;

    /// Acknowledge successful processing of a message.
    async fn ack(&self, message_id: &str) -> Result<(), BusError>;

    async fn health_check(&self) -> Result<BusHealth, BusError>;
}
