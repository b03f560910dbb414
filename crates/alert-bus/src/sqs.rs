//! AWS SQS bus adapter.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use alert_core::config::BusConfig;

use crate::adapter::{BusAdapter, BusHealth, BusMessage};
use crate::error::BusError;

pub struct SqsBusAdapter {
    client: Client,
    queue_url: String,
}

impl SqsBusAdapter {
    pub async fn new(queue_url: &str, region: &str) -> Result<Self, BusError> {
        let region = aws_sdk_sqs::config::Region::new(region.to_string());
        let sqs_config = aws_sdk_sqs::Config::builder()
            .region(region)
            .behavior_version(BehaviorVersion::latest())
            .build();
        let client = Client::from_conf(sqs_config);
        Ok(Self {
            client,
            queue_url: queue_url.to_string(),
        })
    }

    pub async fn with_static_credentials(
        queue_url: &str,
        region: &str,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<Self, BusError> {
        let region_obj = aws_sdk_sqs::config::Region::new(region.to_string());
        let creds = Credentials::new(access_key_id, secret_access_key, None, None, "alert-bus-static");
        let sqs_config = aws_sdk_sqs::Config::builder()
            .region(region_obj)
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(creds)
            .build();
        Ok(Self {
            client: Client::from_conf(sqs_config),
            queue_url: queue_url.to_string(),
        })
    }

    /// `BusConfig` names brokers/topic generically; SQS treats the first
    /// broker entry as the queue url.
    pub async fn from_bus_config(cfg: &BusConfig, region: &str) -> Result<Self, BusError> {
        let queue_url = cfg
            .brokers
            .first()
            .ok_or_else(|| BusError::NotConfigured("bus.brokers must name an SQS queue url".into()))?;
        Self::new(queue_url, region).await
    }
}

#[async_trait]
impl BusAdapter for SqsBusAdapter {
    async fn read_message(&self, cancel: &CancellationToken) -> Result<BusMessage, BusError> {
        loop {
            if cancel.is_cancelled() {
                return Err(BusError::Cancelled);
            }

            let resp = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(1)
                .wait_time_seconds(20)
                .message_system_attribute_names(aws_sdk_sqs::types::MessageSystemAttributeName::All)
                .send()
                .await
                .map_err(|e| BusError::Connection(format!("SQS receive failed: {e:?}")))?;

            let Some(msg) = resp.messages.unwrap_or_default().into_iter().next() else {
                continue;
            };

            let id = msg
                .receipt_handle()
                .ok_or_else(|| BusError::Parse("missing receipt handle".into()))?
                .to_string();

            let body = msg.body().unwrap_or("").as_bytes().to_vec();

            let timestamp = msg
                .attributes()
                .and_then(|attrs| attrs.get(&aws_sdk_sqs::types::MessageSystemAttributeName::SentTimestamp))
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now);

            let attempt_count = msg
                .attributes()
                .and_then(|attrs| {
                    attrs.get(&aws_sdk_sqs::types::MessageSystemAttributeName::ApproximateReceiveCount)
                })
                .and_then(|c| c.parse::<u32>().ok())
                .unwrap_or(1);

            debug!(receipt_handle = %id, "received SQS message");

            return Ok(BusMessage {
                id,
                body,
                timestamp,
                attempt_count,
            });
        }
    }

    async fn ack(&self, message_id: &str) -> Result<(), BusError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(message_id)
            .send()
            .await
            .map_err(|e| BusError::Ack(format!("SQS delete failed: {e:?}")))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<BusHealth, BusError> {
        self.client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .send()
            .await
            .map_err(|e| BusError::Connection(format!("SQS health check failed: {e:?}")))?;
        Ok(BusHealth {
            connected: true,
            provider: "sqs".to_string(),
        })
    }
}
