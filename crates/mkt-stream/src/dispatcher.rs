//! Concurrent batch dispatcher.
//!
//! # Flow
//!
//! ```text
//! send_batch(batch)
//!   ├─ refresh_markets: register + announce each new market, in order
//!   ├─ fan-out: one dispatch unit per event on a JoinSet
//!   │     resolve market id → serialize → partition = id mod N → publish
//!   └─ join all units → BatchReport { attempted, succeeded, first error }
//! ```
//!
//! Units are independent: one unit failing never cancels its siblings, and
//! each send is bounded by its own deadline. A shared semaphore caps the
//! number of units in flight across all concurrent batches. Events carry no
//! ordering guarantee, even within one partition.
//!
//! The reported error is the first failure to *complete*, which varies with
//! scheduling when several units fail.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use mkt_core::config::DispatchConfig;
use mkt_core::time_util::format_epoch_secs;
use mkt_core::{BatchReport, MarketDef, MatchBatch, MatchResult, StreamError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::discovery::DiscoveryRegistrar;
use crate::producer::ProducerPool;
use crate::registry::MarketRegistry;

/// Publishes match-result batches across the producer pool.
///
/// Cheap to share: wrap in an `Arc` and call [`send_batch`](Self::send_batch)
/// from as many tasks as needed.
pub struct Dispatcher {
    registry: Arc<MarketRegistry>,
    registrar: Arc<DiscoveryRegistrar>,
    pool: Arc<ProducerPool>,
    send_timeout: Duration,
    in_flight: Arc<Semaphore>,
}

impl Dispatcher {
    /// Fails with `Config` when `config` does not pass validation.
    pub fn new(
        registry: Arc<MarketRegistry>,
        registrar: Arc<DiscoveryRegistrar>,
        pool: Arc<ProducerPool>,
        config: &DispatchConfig,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            registry,
            registrar,
            pool,
            send_timeout: config.send_timeout(),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight)),
        })
    }

    pub fn registry(&self) -> &Arc<MarketRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ProducerPool> {
        &self.pool
    }

    /// Register and announce new markets, one at a time, in batch order.
    ///
    /// Duplicate symbols within `markets` are handled once (first wins).
    /// Markets already registered with the same id are announced again so a
    /// retried batch re-syncs the downstream directory.
    pub async fn refresh_markets(&self, markets: &[MarketDef]) -> Result<(), StreamError> {
        debug!(
            "refreshing {} market(s), discovery enabled: {}",
            markets.len(),
            self.registrar.is_enabled()
        );
        let mut seen = AHashSet::with_capacity(markets.len());
        for market in markets {
            if !seen.insert(market.symbol.as_str()) {
                continue;
            }
            let outcome = self.registry.register(&market.symbol, market.market_id)?;
            debug!("market {market}: {outcome:?}");
            self.registrar.announce(market).await?;
        }
        Ok(())
    }

    /// Publish every event in `batch` and report the outcome.
    ///
    /// A batch with neither match results nor new markets returns `{0, 0,
    /// None}` without touching anything. New markets are processed before
    /// any event; if that fails, no event is sent and the report carries the
    /// error with zero counts. This also applies to a batch whose only
    /// content is new markets, so "empty" for the no-error guarantee means
    /// no match results and no market definitions.
    pub async fn send_batch(&self, batch: &MatchBatch) -> BatchReport {
        if batch.is_empty() {
            return BatchReport::default();
        }

        if let Err(e) = self.refresh_markets(&batch.new_markets).await {
            warn!("batch aborted before dispatch: {e}");
            return BatchReport::aborted(e);
        }

        let attempted = batch.match_results.len();
        if attempted == 0 {
            return BatchReport::default();
        }

        let mut units = JoinSet::new();
        for event in &batch.match_results {
            let permit = match Arc::clone(&self.in_flight).acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    // The semaphore is never closed; treat it as a unit failure.
                    units.spawn(async move { Err(StreamError::Internal(e.to_string())) });
                    continue;
                }
            };
            let registry = Arc::clone(&self.registry);
            let pool = Arc::clone(&self.pool);
            let event = event.clone();
            let timeout = self.send_timeout;
            units.spawn(async move {
                let result = dispatch_unit(&registry, &pool, &event, timeout).await;
                drop(permit);
                result
            });
        }

        let mut succeeded = 0;
        let mut first_error = None;
        while let Some(joined) = units.join_next().await {
            let err = match joined {
                Ok(Ok(())) => {
                    succeeded += 1;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => StreamError::Internal(format!("dispatch unit failed: {e}")),
            };
            debug!("dispatch unit failed: {err}");
            first_error.get_or_insert(err);
        }

        let report = BatchReport { attempted, succeeded, error: first_error };
        if let Some(e) = &report.error {
            warn!("{} of {attempted} match results failed, first error: {e}", report.failed());
        }
        report
    }
}

/// Resolve, serialize and publish one event.
async fn dispatch_unit(
    registry: &MarketRegistry,
    pool: &ProducerPool,
    event: &MatchResult,
    timeout: Duration,
) -> Result<(), StreamError> {
    let market_id = registry
        .resolve(&event.product)
        .ok_or_else(|| StreamError::UnresolvableMarket { product: event.product.clone() })?;

    event.check_metadata()?;
    let payload = serde_json::to_vec(event)?;
    let partition = pool.partition_for(market_id);

    let started = Instant::now();
    let message_id = pool.publish(partition, payload, started + timeout).await?;

    debug!(
        "successfully send matchResult [marketId:{market_id}, CreatedTime:{}, BlockHeight:{}, Quantity:{}, Price:{}, InstrumentName:{}] partition={partition} id={message_id} in {:?}",
        format_epoch_secs(event.timestamp),
        event.block_height,
        event.quantity,
        event.price,
        event.product,
        started.elapsed(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::producer::PartitionProducer;
    use crate::testing::{Behavior, MemoryProducer, RecordingDiscovery, memory_pool};

    fn settings(send_timeout_ms: u64, max_in_flight: usize) -> DispatchConfig {
        DispatchConfig { send_timeout_ms, max_in_flight }
    }

    fn dispatcher_over(pool: ProducerPool, registrar: DiscoveryRegistrar) -> Dispatcher {
        Dispatcher::new(
            Arc::new(MarketRegistry::new()),
            Arc::new(registrar),
            Arc::new(pool),
            &settings(1_000, 64),
        )
        .unwrap()
    }

    fn event(product: &str, height: i64) -> MatchResult {
        MatchResult::new(product, 100.0 + height as f64, 1.5, height, 1_700_000_000 + height)
    }

    fn markets() -> Vec<MarketDef> {
        vec![MarketDef::new("btc_usdt", 0), MarketDef::new("eth_usdt", 1), MarketDef::new("okt_usdt", 5)]
    }

    #[test]
    fn out_of_range_in_flight_cap_rejected() {
        for cap in [0, usize::MAX] {
            let (pool, _) = memory_pool(1);
            let res = Dispatcher::new(
                Arc::new(MarketRegistry::new()),
                Arc::new(DiscoveryRegistrar::disabled()),
                Arc::new(pool),
                &settings(1_000, cap),
            );
            assert!(matches!(res, Err(StreamError::Config(_))), "cap {cap}");
        }
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let (pool, producers) = memory_pool(3);
        let d = dispatcher_over(pool, DiscoveryRegistrar::disabled());

        let report = d.send_batch(&MatchBatch::default()).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.succeeded, 0);
        assert!(report.error.is_none());
        assert!(producers.iter().all(|p| p.sent().is_empty()));
    }

    #[tokio::test]
    async fn markets_only_batch_still_registers_and_surfaces_failure() {
        let (pool, producers) = memory_pool(2);
        let client = Arc::new(RecordingDiscovery::resolving_to("http://market:7070").failing_registration());
        let d = dispatcher_over(pool, DiscoveryRegistrar::new(client.clone(), "market-quotations", None));

        let report = d.send_batch(&MatchBatch::new(Vec::new(), markets())).await;
        assert_eq!((report.attempted, report.succeeded), (0, 0));
        assert!(matches!(report.error, Some(StreamError::DiscoveryRegistration { .. })));
        assert_eq!(d.registry().resolve("btc_usdt"), Some(0));
        assert_eq!(client.resolve_calls(), 1);
        assert!(producers.iter().all(|p| p.sent().is_empty()));

        let quiet = dispatcher_over(memory_pool(1).0, DiscoveryRegistrar::new(client.clone(), "market-quotations", None));
        assert!(quiet.send_batch(&MatchBatch::default()).await.error.is_none());
        assert_eq!(client.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn all_events_delivered_to_their_partitions() {
        let (pool, producers) = memory_pool(4);
        let d = dispatcher_over(pool, DiscoveryRegistrar::disabled());

        let events: Vec<MatchResult> =
            (0..12).map(|h| event(["btc_usdt", "eth_usdt", "okt_usdt"][h as usize % 3], h)).collect();
        let report = d.send_batch(&MatchBatch::new(events.clone(), markets())).await;

        assert!(report.is_complete(), "{report}");
        assert_eq!((report.attempted, report.succeeded), (12, 12));

        // okt_usdt (id 5) lands on partition 1 with eth_usdt (id 1): 5 ≡ 1 mod 4.
        let expected_partition = |product: &str| match product {
            "btc_usdt" => 0,
            "eth_usdt" | "okt_usdt" => 1,
            _ => unreachable!(),
        };
        let mut delivered = HashSet::new();
        for (i, p) in producers.iter().enumerate() {
            for payload in p.sent() {
                let decoded: MatchResult = serde_json::from_slice(&payload).unwrap();
                assert_eq!(expected_partition(&decoded.product), i);
                assert_eq!(payload, serde_json::to_vec(&decoded).unwrap());
                delivered.insert(decoded.block_height);
            }
        }
        assert!(producers[2].sent().is_empty() && producers[3].sent().is_empty());
        assert_eq!(delivered, (0..12).collect::<HashSet<i64>>());
    }

    #[tokio::test]
    async fn unregistered_symbol_fails_only_its_unit() {
        let (pool, producers) = memory_pool(2);
        let d = dispatcher_over(pool, DiscoveryRegistrar::disabled());
        d.refresh_markets(&markets()).await.unwrap();

        let events = vec![event("btc_usdt", 1), event("doge_usdt", 2), event("eth_usdt", 3), event("okt_usdt", 4)];
        let report = d.send_batch(&MatchBatch::new(events, Vec::new())).await;

        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 3);
        assert_eq!(
            report.error,
            Some(StreamError::UnresolvableMarket { product: "doge_usdt".into() })
        );
        let total: usize = producers.iter().map(|p| p.sent().len()).sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn colliding_metadata_fails_only_its_unit() {
        let (pool, producers) = memory_pool(2);
        let d = dispatcher_over(pool, DiscoveryRegistrar::disabled());

        let mut bad = event("btc_usdt", 1);
        bad.metadata.insert("price".into(), 999.into());
        let batch = MatchBatch::new(vec![bad, event("eth_usdt", 2)], markets());
        let report = d.send_batch(&batch).await;

        assert_eq!((report.attempted, report.succeeded), (2, 1));
        assert!(matches!(report.error, Some(StreamError::Serialization(_))));
        assert!(producers[0].sent().is_empty());
        assert_eq!(producers[1].sent().len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_and_timeout_reported() {
        let fail = Arc::new(MemoryProducer::new("t-partition-0", Behavior::Fail("rejected".into())));
        let hang = Arc::new(MemoryProducer::new("t-partition-1", Behavior::Hang));
        let ok = Arc::new(MemoryProducer::new("t-partition-2", Behavior::Ack));
        let producers: Vec<Arc<dyn PartitionProducer>> = vec![fail, hang, ok.clone()];
        let d = Dispatcher::new(
            Arc::new(MarketRegistry::new()),
            Arc::new(DiscoveryRegistrar::disabled()),
            Arc::new(ProducerPool::from_producers(producers).unwrap()),
            &settings(50, 16),
        )
        .unwrap();

        let defs = vec![MarketDef::new("a", 0), MarketDef::new("b", 1), MarketDef::new("c", 2)];
        let events = vec![event("a", 1), event("b", 2), event("c", 3)];
        let report = d.send_batch(&MatchBatch::new(events, defs)).await;

        assert_eq!((report.attempted, report.succeeded), (3, 1));
        assert!(matches!(
            report.error,
            Some(StreamError::PublishFailure { .. } | StreamError::PublishTimeout { partition: 1 })
        ));
        assert_eq!(ok.sent().len(), 1);

        // The pool stays usable after a failed batch.
        let again = d.send_batch(&MatchBatch::new(vec![event("c", 4)], Vec::new())).await;
        assert!(again.is_complete());
    }

    #[tokio::test]
    async fn new_markets_registered_and_announced_in_order() {
        let (pool, _) = memory_pool(2);
        let client = Arc::new(RecordingDiscovery::resolving_to("http://market:7070"));
        let d = dispatcher_over(pool, DiscoveryRegistrar::new(client.clone(), "market-quotations", None));

        let mut defs = markets();
        defs.push(MarketDef::new("btc_usdt", 0));
        let report = d.send_batch(&MatchBatch::new(vec![event("okt_usdt", 1)], defs)).await;

        assert!(report.is_complete());
        assert_eq!(d.registry().resolve("okt_usdt"), Some(5));
        let announced: Vec<u64> = client.registrations().iter().map(|r| r.0).collect();
        assert_eq!(announced, vec![0, 1, 5]);
    }

    #[tokio::test]
    async fn registration_failure_aborts_batch() {
        let (pool, producers) = memory_pool(2);
        let client = Arc::new(RecordingDiscovery::resolving_to("http://market:7070").failing_registration());
        let d = dispatcher_over(pool, DiscoveryRegistrar::new(client, "market-quotations", None));

        let report = d.send_batch(&MatchBatch::new(vec![event("btc_usdt", 1)], markets())).await;
        assert_eq!((report.attempted, report.succeeded), (0, 0));
        assert!(matches!(report.error, Some(StreamError::DiscoveryRegistration { market_id: 0, .. })));
        assert!(producers.iter().all(|p| p.sent().is_empty()));
        // The registry update itself is kept.
        assert_eq!(d.registry().resolve("btc_usdt"), Some(0));
    }

    #[tokio::test]
    async fn conflicting_market_aborts_batch() {
        let (pool, _) = memory_pool(2);
        let d = dispatcher_over(pool, DiscoveryRegistrar::disabled());
        d.refresh_markets(&markets()).await.unwrap();

        let report = d
            .send_batch(&MatchBatch::new(vec![event("btc_usdt", 1)], vec![MarketDef::new("btc_usdt", 9)]))
            .await;
        assert!(matches!(report.error, Some(StreamError::MarketConflict { .. })));
        assert_eq!(d.registry().resolve("btc_usdt"), Some(0));
    }

    #[tokio::test]
    async fn in_flight_cap_smaller_than_batch() {
        let (pool, producers) = memory_pool(3);
        let d = Dispatcher::new(
            Arc::new(MarketRegistry::with_markets(&markets()).unwrap()),
            Arc::new(DiscoveryRegistrar::disabled()),
            Arc::new(pool),
            &settings(1_000, 2),
        )
        .unwrap();
        let events: Vec<MatchResult> = (0..50).map(|h| event("okt_usdt", h)).collect();
        let report = d.send_batch(&MatchBatch::new(events, Vec::new())).await;
        assert_eq!((report.attempted, report.succeeded), (50, 50));
        assert_eq!(producers[2].sent().len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_batches_do_not_interfere() {
        let (pool, producers) = memory_pool(4);
        let d = Arc::new(Dispatcher::new(
            Arc::new(MarketRegistry::with_markets(&markets()).unwrap()),
            Arc::new(DiscoveryRegistrar::disabled()),
            Arc::new(pool),
            &settings(1_000, 8),
        )
        .unwrap());

        let callers: Vec<_> = (0..8i64)
            .map(|c| {
                let d = Arc::clone(&d);
                tokio::spawn(async move {
                    let product = if c % 2 == 0 { "btc_usdt" } else { "okt_usdt" };
                    let events: Vec<MatchResult> = (0..25).map(|h| event(product, c * 1000 + h)).collect();
                    d.send_batch(&MatchBatch::new(events, Vec::new())).await
                })
            })
            .collect();

        let reports = tokio::time::timeout(Duration::from_secs(10), futures_util::future::join_all(callers))
            .await
            .expect("concurrent batches deadlocked");
        for r in reports {
            let r = r.unwrap();
            assert!(r.is_complete(), "{r}");
            assert_eq!(r.succeeded, 25);
        }

        // btc_usdt (id 0) → partition 0, okt_usdt (id 5) → partition 1.
        for payload in producers[0].sent() {
            let ev: MatchResult = serde_json::from_slice(&payload).unwrap();
            assert_eq!(ev.product, "btc_usdt");
        }
        for payload in producers[1].sent() {
            let ev: MatchResult = serde_json::from_slice(&payload).unwrap();
            assert_eq!(ev.product, "okt_usdt");
        }
        assert_eq!(producers[0].sent().len() + producers[1].sent().len(), 200);
    }
}
