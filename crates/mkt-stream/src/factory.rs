//! Publisher factory — wires registry, pool, registrar and dispatcher from
//! config.

use std::sync::Arc;

use mkt_core::StreamError;
use mkt_core::config::AppConfig;
use tracing::info;

use crate::discovery::DiscoveryRegistrar;
use crate::dispatcher::Dispatcher;
use crate::producer::{ErrorSink, ProducerPool};
use crate::registry::MarketRegistry;

/// Build a [`Dispatcher`] backed by Pulsar producers and, when enabled, the
/// Eureka registrar.
///
/// Must be called inside a tokio runtime: each partition's connection task
/// is spawned here. Transport errors raised outside send calls go to
/// `error_sink`.
pub fn create_dispatcher(config: &AppConfig, error_sink: Option<ErrorSink>) -> Result<Dispatcher, StreamError> {
    config.validate()?;

    let registry = Arc::new(MarketRegistry::new());
    let registrar = Arc::new(DiscoveryRegistrar::from_config(&config.discovery)?);
    let pool = Arc::new(ProducerPool::connect(&config.pulsar, error_sink)?);

    info!(
        "publisher ready: topic={} partitions={} discovery={} send_timeout={:?}",
        config.pulsar.topic,
        pool.partitions(),
        registrar.is_enabled(),
        config.dispatch.send_timeout(),
    );
    Dispatcher::new(registry, registrar, pool, &config.dispatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_one_slot_per_partition() {
        let config = AppConfig::from_json(
            &serde_json::json!({
                "pulsar": { "broker_url": "ws://127.0.0.1:9", "topic": "dex", "partitions": 3 }
            })
            .to_string(),
        )
        .unwrap();

        let d = create_dispatcher(&config, None).unwrap();
        assert_eq!(d.pool().partitions(), 3);
        assert_eq!(d.pool().topic(2), Some("dex-partition-2"));
        assert!(d.registry().is_empty());
        d.pool().shutdown().await;
    }

    #[tokio::test]
    async fn invalid_config_rejected() {
        let config = AppConfig::from_json(
            &serde_json::json!({
                "pulsar": { "broker_url": "ws://127.0.0.1:9", "topic": "", "partitions": 3 }
            })
            .to_string(),
        )
        .unwrap();
        assert!(matches!(create_dispatcher(&config, None), Err(StreamError::Config(_))));
    }
}
