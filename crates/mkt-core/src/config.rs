//! Configuration parsing for the market stream publisher.
//!
//! Settings come from a single JSON file. Only the `pulsar` block is
//! required; dispatch and discovery settings fall back to defaults.
//!
//! # Example config
//!
//! ```json
//! {
//!   "module": { "module_name": "market_stream", "log_path": "/tmp/log" },
//!   "pulsar": {
//!     "broker_url": "ws://127.0.0.1:8080",
//!     "topic": "dex_spot_match",
//!     "partitions": 8
//!   },
//!   "dispatch": { "send_timeout_ms": 10000, "max_in_flight": 1024 },
//!   "discovery": {
//!     "enabled": true,
//!     "eureka_url": "http://127.0.0.1:8761/eureka",
//!     "service_name": "market-quotations"
//!   }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::StreamError;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub module: Option<ModuleMeta>,

    /// Message-bus producer settings.
    pub pulsar: PulsarConfig,

    /// Batch dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Service-discovery settings for announcing new markets.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Interval for printing per-partition publish latency (ms, 0 = never).
    #[serde(default = "default_latency_print_interval_ms")]
    pub latency_print_interval_ms: u64,
}

impl AppConfig {
    /// Parse a config from a JSON string without validating it.
    pub fn from_json(content: &str) -> Result<Self, StreamError> {
        serde_json::from_str(content).map_err(|e| StreamError::Config(e.to_string()))
    }

    /// Returns the module name, defaulting to `"market_stream"`.
    pub fn module_name(&self) -> String {
        self.module
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "market_stream".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.module.as_ref().and_then(|m| m.log_path.clone())
    }

    pub fn latency_print_interval(&self) -> Option<Duration> {
        (self.latency_print_interval_ms > 0)
            .then(|| Duration::from_millis(self.latency_print_interval_ms))
    }

    /// Check every section for values the publisher cannot run with.
    pub fn validate(&self) -> Result<(), StreamError> {
        self.pulsar.validate()?;
        self.dispatch.validate()?;
        self.discovery.validate()
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Pulsar producer configuration.
///
/// One producer is created per partition, targeting
/// `<topic>-partition-<i>` on the broker's WebSocket endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PulsarConfig {
    /// Broker WebSocket service URL (e.g. `ws://127.0.0.1:8080`).
    pub broker_url: String,

    /// Logical topic name; partitions append `-partition-<i>`.
    pub topic: String,

    /// Number of partitions (fixed for the process lifetime).
    pub partitions: usize,

    #[serde(default = "default_tenant")]
    pub tenant: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Producer name suffix; the full name is `<uuid>-<producer_name>-<i>`.
    #[serde(default = "default_producer_name")]
    pub producer_name: String,

    /// Timeout for establishing one producer connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// First reconnect delay after a connection failure.
    #[serde(default = "default_initial_reconnect_delay_ms")]
    pub initial_reconnect_delay_ms: u64,

    /// Cap on the doubling reconnect delay.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
}

impl PulsarConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn initial_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.partitions == 0 {
            return Err(StreamError::Config("pulsar.partitions must be at least 1".into()));
        }
        if self.topic.trim().is_empty() {
            return Err(StreamError::Config("pulsar.topic must not be empty".into()));
        }
        let url = url::Url::parse(&self.broker_url)
            .map_err(|e| StreamError::Config(format!("pulsar.broker_url {}: {e}", self.broker_url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(StreamError::Config(format!(
                "pulsar.broker_url must use ws:// or wss://, got {}",
                self.broker_url
            )));
        }
        if self.initial_reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(StreamError::Config(
                "pulsar.initial_reconnect_delay_ms exceeds max_reconnect_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Upper bound for `dispatch.max_in_flight`. Stays well below the permit
/// limit of tokio's semaphore.
pub const MAX_IN_FLIGHT_LIMIT: usize = 1 << 20;

/// Batch dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Hard upper bound on a single send, from hand-off to broker ack.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Maximum dispatch units in flight across all concurrent batches.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.send_timeout_ms == 0 {
            return Err(StreamError::Config("dispatch.send_timeout_ms must be positive".into()));
        }
        if self.max_in_flight == 0 {
            return Err(StreamError::Config("dispatch.max_in_flight must be at least 1".into()));
        }
        if self.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(StreamError::Config(format!(
                "dispatch.max_in_flight must not exceed {MAX_IN_FLIGHT_LIMIT}, got {}",
                self.max_in_flight
            )));
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Service-discovery configuration (Eureka directory).
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// When false, new markets are never announced.
    #[serde(default)]
    pub enabled: bool,

    /// Eureka REST base URL (e.g. `http://127.0.0.1:8761/eureka`).
    #[serde(default)]
    pub eureka_url: String,

    /// Registered application name of the market service.
    #[serde(default)]
    pub service_name: String,

    /// Market service URL used when the directory lookup fails.
    pub fallback_url: Option<String>,

    /// Path appended to the market service URL for registrations.
    #[serde(default = "default_register_path")]
    pub register_path: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl DiscoveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if !self.enabled {
            return Ok(());
        }
        if self.eureka_url.trim().is_empty() {
            return Err(StreamError::Config("discovery.eureka_url is required when enabled".into()));
        }
        if self.service_name.trim().is_empty() {
            return Err(StreamError::Config("discovery.service_name is required when enabled".into()));
        }
        url::Url::parse(&self.eureka_url)
            .map_err(|e| StreamError::Config(format!("discovery.eureka_url {}: {e}", self.eureka_url)))?;
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            eureka_url: String::new(),
            service_name: String::new(),
            fallback_url: None,
            register_path: default_register_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_tenant() -> String {
    "public".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_producer_name() -> String {
    "subs_standard_dex_spot".to_string()
}

fn default_register_path() -> String {
    "/manager/add".to_string()
}

const fn default_connect_timeout_ms() -> u64 {
    3_000
}

const fn default_initial_reconnect_delay_ms() -> u64 {
    1_000
}

const fn default_max_reconnect_delay_ms() -> u64 {
    60_000
}

const fn default_send_timeout_ms() -> u64 {
    10_000
}

const fn default_max_in_flight() -> usize {
    1024
}

const fn default_request_timeout_ms() -> u64 {
    5_000
}

const fn default_latency_print_interval_ms() -> u64 {
    30_000
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = AppConfig::from_json(&content)?;
    config.validate()?;
    debug!(
        "config {} loaded: topic={}, partitions={}, discovery={}",
        path.display(),
        config.pulsar.topic,
        config.pulsar.partitions,
        config.discovery.enabled
    );
    Ok(config)
}
