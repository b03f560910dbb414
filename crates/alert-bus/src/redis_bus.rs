//! Redis Streams bus adapter: `XREADGROUP` for consumption, `XACK` for
//! acknowledgement. Reference adapter for deployments without a Kafka-style
//! broker.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use alert_core::config::BusConfig;

use crate::adapter::{BusAdapter, BusHealth, BusMessage};
use crate::error::BusError;

pub struct RedisStreamsAdapter {
    conn: tokio::sync::Mutex<ConnectionManager>,
    stream: String,
    group: String,
    consumer: String,
}

impl RedisStreamsAdapter {
    pub async fn connect(cfg: &BusConfig, address: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(address).map_err(|e| BusError::Connection(e.to_string()))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        // XGROUP CREATE is idempotent-ish: BUSYGROUP means it already exists.
        let _: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&cfg.topic)
            .arg(&cfg.group_id)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        Ok(Self {
            conn: tokio::sync::Mutex::new(conn),
            stream: cfg.topic.clone(),
            group: cfg.group_id.clone(),
            consumer: format!("{}-{}", cfg.group_id, uuid::Uuid::new_v4()),
        })
    }
}

#[async_trait]
impl BusAdapter for RedisStreamsAdapter {
    async fn read_message(&self, cancel: &CancellationToken) -> Result<BusMessage, BusError> {
        let mut conn = self.conn.lock().await;
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(500);

        loop {
            if cancel.is_cancelled() {
                return Err(BusError::Cancelled);
            }
            let reply: StreamReadReply = conn
                .xread_options(&[&self.stream], &[">"], &opts)
                .await
                .map_err(|e| BusError::Connection(e.to_string()))?;

            for key in reply.keys {
                if let Some(entry) = key.ids.into_iter().next() {
                    let body = entry
                        .map
                        .get("data")
                        .and_then(|v| match v {
                            redis::Value::BulkString(bytes) => Some(bytes.clone()),
                            _ => None,
                        })
                        .ok_or_else(|| BusError::Parse("missing 'data' field in stream entry".into()))?;
                    return Ok(BusMessage {
                        id: entry.id,
                        body,
                        timestamp: chrono::Utc::now(),
                        attempt_count: 1,
                    });
                }
            }
        }
    }

    async fn ack(&self, message_id: &str) -> Result<(), BusError> {
        let mut conn = self.conn.lock().await;
        conn.xack::<_, _, _, ()>(&self.stream, &self.group, &[message_id])
            .await
            .map_err(|e| BusError::Ack(e.to_string()))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<BusHealth, BusError> {
        let mut conn = self.conn.lock().await;
        let pong: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(BusHealth {
            connected: pong == "PONG",
            provider: "redis-streams".to_string(),
        })
    }
}
