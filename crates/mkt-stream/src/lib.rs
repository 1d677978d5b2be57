//! # mkt-stream
//!
//! Partitioned market-event publisher.
//!
//! ## Architecture
//!
//! ```text
//! MatchBatch ──► Dispatcher ──► MarketRegistry (symbol → id)
//!                    │      └─► DiscoveryRegistrar (announce new markets)
//!                    └─► ProducerPool ──► slot[id mod N] ──► <topic>-partition-<i>
//! ```
//!
//! - [`registry`] — shared, append-only symbol → market id map
//! - [`producer`] — `PartitionProducer` seam and the fixed-size pool
//! - [`pulsar`] — Pulsar WebSocket producer with auto-reconnect
//! - [`discovery`] — market announcements via an Eureka directory
//! - [`dispatcher`] — batch fan-out, per-send deadlines, error aggregation
//! - [`factory`] — builds a dispatcher from config

pub mod discovery;
pub mod dispatcher;
pub mod factory;
pub mod producer;
pub mod pulsar;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::Dispatcher;
pub use factory::create_dispatcher;
pub use producer::{ErrorSink, PartitionProducer, ProducerPool};
pub use registry::{MarketRegistry, Registration};
