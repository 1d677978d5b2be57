//! Match-result events and the batches they arrive in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::market::MarketDef;
use crate::error::StreamError;

/// Top-level wire names owned by [`MatchResult`]'s own fields. Metadata keys
/// must not reuse them.
pub const RESERVED_FIELDS: [&str; 5] = ["blockHeight", "product", "price", "volume", "timestamp"];

/// One executed trade as reported by the matching engine.
///
/// The JSON encoding of this struct is the message payload published to the
/// bus. Extra trade metadata is carried in `metadata` and flattened into the
/// top-level object; keys listed in [`RESERVED_FIELDS`] are not allowed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "blockHeight")]
    pub block_height: i64,
    /// Symbol of the market this trade belongs to.
    pub product: String,
    pub price: f64,
    #[serde(rename = "volume")]
    pub quantity: f64,
    /// Trade time, seconds since Unix epoch.
    pub timestamp: i64,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MatchResult {
    pub fn new(product: impl Into<String>, price: f64, quantity: f64, block_height: i64, timestamp: i64) -> Self {
        Self {
            block_height,
            product: product.into(),
            price,
            quantity,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata field, returning the event for chaining.
    ///
    /// Keys in [`RESERVED_FIELDS`] are ignored.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let key = key.into();
        if !RESERVED_FIELDS.contains(&key.as_str()) {
            self.metadata.insert(key, value.into());
        }
        self
    }

    /// Fails with `Serialization` when a metadata key would duplicate one of
    /// the event's own top-level fields in the payload.
    pub fn check_metadata(&self) -> Result<(), StreamError> {
        match self.metadata.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            Some(key) => Err(StreamError::Serialization(format!(
                "metadata key {key:?} collides with a match result field"
            ))),
            None => Ok(()),
        }
    }
}

/// One engine block's worth of output: trades plus markets seen for the
/// first time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchBatch {
    #[serde(rename = "matchResults", default)]
    pub match_results: Vec<MatchResult>,
    #[serde(rename = "newTokenPairs", default)]
    pub new_markets: Vec<MarketDef>,
}

impl MatchBatch {
    pub fn new(match_results: Vec<MatchResult>, new_markets: Vec<MarketDef>) -> Self {
        Self { match_results, new_markets }
    }

    pub fn is_empty(&self) -> bool {
        self.match_results.is_empty() && self.new_markets.is_empty()
    }
}
