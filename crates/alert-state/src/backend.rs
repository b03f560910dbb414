//! Feature-gated backend selection: pick the `StateStore` impl named by
//! config, returning a clear "feature not enabled" error when the matching
//! Cargo feature is off.

use std::sync::Arc;

use alert_core::config::StateStoreConfig;

use crate::error::StateError;
use crate::memory::InMemoryStateStore;
use crate::store::StateStore;

/// Build the configured [`StateStore`]. `kind` is one of `"memory"`, `"redis"`.
pub async fn build_backend(
    kind: &str,
    cfg: &StateStoreConfig,
) -> Result<Arc<dyn StateStore>, StateError> {
    match kind {
        "memory" => Ok(InMemoryStateStore::new()),

        "redis" => {
            #[cfg(feature = "redis-backend")]
            {
                let store = crate::redis_store::RedisStateStore::connect(cfg).await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "redis-backend"))]
            {
                let _ = cfg;
                Err(StateError::NotConfigured(
                    "redis state store backend requires the 'redis-backend' Cargo feature".into(),
                ))
            }
        }

        other => Err(StateError::NotConfigured(format!(
            "unknown state store backend '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(backend: &str) -> StateStoreConfig {
        StateStoreConfig {
            backend: backend.into(),
            address: "redis://127.0.0.1:6379".into(),
            password: None,
            database: 0,
            pool_size: 10,
            dial_timeout_ms: 2_000,
            read_timeout_ms: 1_000,
            write_timeout_ms: 1_000,
            cluster_mode: false,
        }
    }

    #[tokio::test]
    async fn memory_backend_always_available() {
        assert!(build_backend("memory", &cfg("memory")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_backend_errors() {
        assert!(build_backend("carrier-pigeon", &cfg("carrier-pigeon"))
            .await
            .is_err());
    }
}
