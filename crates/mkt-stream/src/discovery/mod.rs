//! Discovery registrar — announces new markets to the downstream market
//! service.
//!
//! When enabled, [`DiscoveryRegistrar::announce`] resolves the market
//! service's URL from the directory and registers the market there. A failed
//! lookup is logged and the registrar continues with its fallback URL, if
//! one is configured; a failed registration is returned to the caller since
//! downstream query routing depends on it. When disabled, `announce` is a
//! no-op.

pub mod eureka;

use std::sync::Arc;

use async_trait::async_trait;
use mkt_core::config::DiscoveryConfig;
use mkt_core::{MarketDef, StreamError};
use tracing::{debug, error};

pub use self::eureka::EurekaClient;

/// Directory lookup plus market registration.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Resolve a service name to its base URL.
    async fn resolve(&self, service_name: &str) -> Result<String, StreamError>;

    /// Tell the service at `url` about a new market.
    async fn register_market(&self, market_id: u64, symbol: &str, url: &str) -> Result<(), StreamError>;
}

struct Enabled {
    client: Arc<dyn DiscoveryClient>,
    service_name: String,
    fallback_url: Option<String>,
}

pub struct DiscoveryRegistrar {
    enabled: Option<Enabled>,
}

impl DiscoveryRegistrar {
    /// A registrar that never contacts anything.
    pub fn disabled() -> Self {
        Self { enabled: None }
    }

    pub fn new(client: Arc<dyn DiscoveryClient>, service_name: impl Into<String>, fallback_url: Option<String>) -> Self {
        Self {
            enabled: Some(Enabled { client, service_name: service_name.into(), fallback_url }),
        }
    }

    /// Build from config, using [`EurekaClient`] when discovery is enabled.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, StreamError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        config.validate()?;
        let client = EurekaClient::new(&config.eureka_url, &config.register_path, config.request_timeout())?;
        Ok(Self::new(Arc::new(client), config.service_name.clone(), config.fallback_url.clone()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.is_some()
    }

    /// Announce `market` to the market service.
    pub async fn announce(&self, market: &MarketDef) -> Result<(), StreamError> {
        let Some(inner) = &self.enabled else {
            return Ok(());
        };

        let url = match inner.client.resolve(&inner.service_name).await {
            Ok(url) => {
                debug!("successfully got the market service url [{url}]");
                Some(url)
            }
            Err(e) => {
                error!("failed to get the market service url: {e}");
                inner.fallback_url.clone()
            }
        };

        let Some(url) = url else {
            return Err(StreamError::DiscoveryRegistration {
                market_id: market.market_id,
                symbol: market.symbol.clone(),
                reason: format!("no url for service {}", inner.service_name),
            });
        };

        inner
            .client
            .register_market(market.market_id, &market.symbol, &url)
            .await
            .inspect_err(|e| error!("failed to register market {market} in market service: {e}"))
    }
}
