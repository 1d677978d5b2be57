//! Market registry — the shared symbol → market id map.
//!
//! The registry is append-only: a symbol keeps its first id for the life of
//! the process, and an id belongs to one symbol. It is owned by whoever
//! builds the [`Dispatcher`](crate::dispatcher::Dispatcher) and shared by
//! `Arc`; every dispatch unit of every batch reads through it.

use ahash::AHashMap;
use mkt_core::{MarketDef, StreamError};
use parking_lot::RwLock;
use tracing::{debug, error};

/// Result of a successful [`MarketRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The symbol was new and is now mapped.
    Inserted,
    /// The symbol was already mapped to the same id.
    AlreadyPresent,
}

#[derive(Debug, Default)]
struct Maps {
    by_symbol: AHashMap<String, u64>,
    by_id: AHashMap<u64, String>,
}

/// Thread-safe, append-only symbol → market id registry.
#[derive(Debug, Default)]
pub struct MarketRegistry {
    maps: RwLock<Maps>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry pre-loaded with known markets.
    pub fn with_markets<'a>(markets: impl IntoIterator<Item = &'a MarketDef>) -> Result<Self, StreamError> {
        let registry = Self::new();
        for m in markets {
            registry.register(&m.symbol, m.market_id)?;
        }
        Ok(registry)
    }

    /// Look up the market id of `symbol`.
    #[inline]
    pub fn resolve(&self, symbol: &str) -> Option<u64> {
        self.maps.read().by_symbol.get(symbol).copied()
    }

    /// Map `symbol` to `market_id` if the symbol is not yet known.
    ///
    /// Re-registering the same pair is a no-op. Remapping a symbol or reusing
    /// an id owned by another symbol is rejected with
    /// [`StreamError::MarketConflict`] and the existing mapping is kept.
    pub fn register(&self, symbol: &str, market_id: u64) -> Result<Registration, StreamError> {
        let mut maps = self.maps.write();

        if let Some(&existing) = maps.by_symbol.get(symbol) {
            if existing == market_id {
                return Ok(Registration::AlreadyPresent);
            }
            error!("market {symbol} already registered as {existing}, refusing id {market_id}");
            return Err(StreamError::MarketConflict {
                symbol: symbol.to_string(),
                market_id,
                detail: format!("symbol already registered as {existing}"),
            });
        }

        if let Some(owner) = maps.by_id.get(&market_id) {
            error!("market id {market_id} already owned by {owner}, refusing symbol {symbol}");
            return Err(StreamError::MarketConflict {
                symbol: symbol.to_string(),
                market_id,
                detail: format!("id already owned by {owner}"),
            });
        }

        maps.by_symbol.insert(symbol.to_string(), market_id);
        maps.by_id.insert(market_id, symbol.to_string());
        debug!("registered market {symbol} -> {market_id} ({} total)", maps.by_symbol.len());
        Ok(Registration::Inserted)
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().by_symbol.is_empty()
    }

    /// All known markets, ordered by id.
    pub fn snapshot(&self) -> Vec<MarketDef> {
        let maps = self.maps.read();
        let mut out: Vec<MarketDef> = maps
            .by_symbol
            .iter()
            .map(|(symbol, &id)| MarketDef::new(symbol.clone(), id))
            .collect();
        out.sort_by_key(|m| m.market_id);
        out
    }
}
