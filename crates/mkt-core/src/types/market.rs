//! Market definitions reported by the matching engine.

use serde::{Deserialize, Serialize};

/// One tradable product: a symbol and its globally unique market id.
///
/// The id is assigned once by the engine and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketDef {
    /// Unique symbol, e.g. `"btc_usdt"`.
    pub symbol: String,
    /// Market id used for partition routing.
    #[serde(rename = "marketId", alias = "id")]
    pub market_id: u64,
}

impl MarketDef {
    pub fn new(symbol: impl Into<String>, market_id: u64) -> Self {
        Self { symbol: symbol.into(), market_id }
    }
}

impl std::fmt::Display for MarketDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.symbol, self.market_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_wire_name() {
        let m = MarketDef::new("okt_usdt", 12);
        assert_eq!(m.to_string(), "okt_usdt#12");
        assert_eq!(serde_json::to_value(&m).unwrap()["marketId"], 12);
    }

    #[test]
    fn accepts_id_alias() {
        let m: MarketDef = serde_json::from_str(r#"{"symbol":"eth_btc","id":3}"#).unwrap();
        assert_eq!(m, MarketDef::new("eth_btc", 3));
    }
}
