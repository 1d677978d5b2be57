//! In-memory producer and discovery fakes for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mkt_core::{MessageId, StreamError};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::discovery::DiscoveryClient;
use crate::producer::{PartitionProducer, ProducerPool, partition_topic};

#[derive(Debug, Clone)]
pub enum Behavior {
    Ack,
    Fail(String),
    Hang,
}

pub struct MemoryProducer {
    topic: String,
    behavior: Behavior,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MemoryProducer {
    pub fn new(topic: &str, behavior: Behavior) -> Self {
        Self { topic: topic.to_string(), behavior, sent: Mutex::new(Vec::new()) }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PartitionProducer for MemoryProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn name(&self) -> &str {
        &self.topic
    }

    async fn send(&self, payload: Vec<u8>, _deadline: Instant) -> Result<MessageId, StreamError> {
        match &self.behavior {
            Behavior::Ack => {
                let mut sent = self.sent.lock();
                sent.push(payload);
                Ok(MessageId(format!("{}:{}", self.topic, sent.len() - 1)))
            }
            Behavior::Fail(reason) => Err(StreamError::PublishFailure { partition: 0, reason: reason.clone() }),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Pool of `n` acking producers on topic `test`.
pub fn memory_pool(n: usize) -> (ProducerPool, Vec<Arc<MemoryProducer>>) {
    let producers: Vec<Arc<MemoryProducer>> = (0..n)
        .map(|i| Arc::new(MemoryProducer::new(&partition_topic("test", i), Behavior::Ack)))
        .collect();
    let handles: Vec<Arc<dyn PartitionProducer>> =
        producers.iter().map(|p| Arc::clone(p) as Arc<dyn PartitionProducer>).collect();
    let pool = ProducerPool::from_producers(handles).expect("non-empty pool");
    (pool, producers)
}

pub struct RecordingDiscovery {
    url: Option<String>,
    fail_registration: bool,
    resolves: AtomicUsize,
    registered: Mutex<Vec<(u64, String, String)>>,
}

impl RecordingDiscovery {
    pub fn resolving_to(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            fail_registration: false,
            resolves: AtomicUsize::new(0),
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn unresolvable() -> Self {
        Self { url: None, ..Self::resolving_to("") }
    }

    pub fn failing_registration(mut self) -> Self {
        self.fail_registration = true;
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<(u64, String, String)> {
        self.registered.lock().clone()
    }
}

#[async_trait]
impl DiscoveryClient for RecordingDiscovery {
    async fn resolve(&self, service_name: &str) -> Result<String, StreamError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.url.clone().ok_or_else(|| StreamError::DiscoveryResolution {
            service: service_name.to_string(),
            reason: "directory unavailable".into(),
        })
    }

    async fn register_market(&self, market_id: u64, symbol: &str, url: &str) -> Result<(), StreamError> {
        if self.fail_registration {
            return Err(StreamError::DiscoveryRegistration {
                market_id,
                symbol: symbol.to_string(),
                reason: "503 Service Unavailable".into(),
            });
        }
        self.registered.lock().push((market_id, symbol.to_string(), url.to_string()));
        Ok(())
    }
}
