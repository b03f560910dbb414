//! Feature-gated backend selection: match on a configured kind, return a
//! clear "feature not enabled" error when the matching Cargo feature is off.

use std::sync::Arc;

use alert_core::config::BusConfig;

use crate::adapter::BusAdapter;
use crate::error::BusError;
use crate::memory::InMemoryBusAdapter;

/// Build the configured [`BusAdapter`]. `kind` is one of `"memory"`,
/// `"redis"`, `"sqs"`.
pub async fn build_backend(kind: &str, cfg: &BusConfig) -> Result<Arc<dyn BusAdapter>, BusError> {
    match kind {
        "memory" => Ok(Arc::new(InMemoryBusAdapter::new())),

        "redis" => {
            #[cfg(feature = "queue-redis")]
            {
                let address = cfg
                    .brokers
                    .first()
                    .ok_or_else(|| BusError::NotConfigured("bus.brokers must name a redis address".into()))?;
                let adapter = crate::redis_bus::RedisStreamsAdapter::connect(cfg, address).await?;
                Ok(Arc::new(adapter))
            }
            #[cfg(not(feature = "queue-redis"))]
            {
                let _ = cfg;
                Err(BusError::NotConfigured(
                    "redis bus backend requires the 'queue-redis' Cargo feature".into(),
                ))
            }
        }

        "sqs" => {
            #[cfg(feature = "queue-sqs")]
            {
                let adapter = crate::sqs::SqsBusAdapter::from_bus_config(cfg, "us-east-1").await?;
                Ok(Arc::new(adapter))
            }
            #[cfg(not(feature = "queue-sqs"))]
            {
                let _ = cfg;
                Err(BusError::NotConfigured(
                    "sqs bus backend requires the 'queue-sqs' Cargo feature".into(),
                ))
            }
        }

        other => Err(BusError::NotConfigured(format!("unknown bus backend '{other}'"))),
    }
}
