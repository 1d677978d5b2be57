//! Typed error definitions for the market stream publisher.
//!
//! [`StreamError`] covers every failure the publisher can report, from a
//! single dispatch unit up to a whole batch. Variants carry owned strings
//! rather than source errors so a report can be cloned, logged, and handed
//! back to the caller without lifetimes. Application plumbing (config file
//! loading, the runner) still uses `anyhow::Result`, which `StreamError`
//! converts into transparently.

use thiserror::Error;

/// Errors produced by the registry, producer pool, discovery registrar and
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The event references a symbol with no registry entry.
    #[error("failed to find {product} marketId")]
    UnresolvableMarket { product: String },

    /// The event could not be encoded to its wire payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The broker did not acknowledge before the per-send deadline.
    #[error("publish to partition {partition} timed out before ack")]
    PublishTimeout { partition: usize },

    /// The broker rejected the message or the connection failed.
    #[error("publish to partition {partition} failed: {reason}")]
    PublishFailure { partition: usize, reason: String },

    /// The directory URL of the downstream service could not be resolved.
    #[error("failed to resolve service {service}: {reason}")]
    DiscoveryResolution { service: String, reason: String },

    /// The downstream service refused or failed the market registration.
    #[error("failed to register market {symbol} (id {market_id}): {reason}")]
    DiscoveryRegistration {
        market_id: u64,
        symbol: String,
        reason: String,
    },

    /// A registration would overwrite an existing symbol or market id.
    #[error("market conflict for {symbol} (id {market_id}): {detail}")]
    MarketConflict {
        symbol: String,
        market_id: u64,
        detail: String,
    },

    /// A dispatch unit panicked or could not be joined.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Stable numeric code, continuing the backend module's 62xxx range.
    pub fn code(&self) -> u32 {
        match self {
            Self::Config(_) => 62016,
            Self::UnresolvableMarket { .. } => 62009,
            Self::Internal(_) => 62011,
            Self::Serialization(_) => 62019,
            Self::PublishTimeout { .. } => 62020,
            Self::PublishFailure { .. } => 62021,
            Self::DiscoveryResolution { .. } => 62022,
            Self::DiscoveryRegistration { .. } => 62023,
            Self::MarketConflict { .. } => 62024,
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
