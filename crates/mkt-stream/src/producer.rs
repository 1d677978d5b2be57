//! Partitioned producer pool.
//!
//! A [`ProducerPool`] owns one [`PartitionProducer`] per partition of the
//! logical topic. Slots are independent: each has its own connection task
//! and queue, so an outage on one partition never delays sends to another.
//!
//! ```text
//! publish(i, payload, deadline) ──► slot[i] ──► <topic>-partition-<i>
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use mkt_core::config::PulsarConfig;
use mkt_core::latency::{LatencyCollector, LatencyStats};
use mkt_core::{MessageId, StreamError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;

use crate::pulsar::{self, PulsarProducer, PulsarProducerConfig};

/// Channel for transport errors raised outside any send call (connection
/// losses, failed reconnects).
pub type ErrorSink = mpsc::UnboundedSender<StreamError>;

/// A send-capable handle for one partition.
///
/// The pool bounds every `send` by `deadline`; implementations may use it to
/// skip work whose caller has already given up.
#[async_trait]
pub trait PartitionProducer: Send + Sync {
    /// Physical topic this producer writes to.
    fn topic(&self) -> &str;

    /// Producer name as announced to the broker.
    fn name(&self) -> &str;

    /// Send one payload and wait for the broker's acknowledgement.
    async fn send(&self, payload: Vec<u8>, deadline: Instant) -> Result<MessageId, StreamError>;

    /// Stop background work. Later sends fail.
    async fn close(&self) {}
}

/// Physical topic name of partition `index`.
pub fn partition_topic(topic: &str, index: usize) -> String {
    format!("{topic}-partition-{index}")
}

struct Slot {
    producer: Arc<dyn PartitionProducer>,
    latency: Mutex<LatencyCollector>,
}

/// Fixed set of per-partition producers.
pub struct ProducerPool {
    slots: Vec<Slot>,
}

impl ProducerPool {
    /// Start one Pulsar WebSocket producer per configured partition.
    ///
    /// Must be called inside a tokio runtime. Connections are established in
    /// the background; sends issued before a slot connects wait in its queue
    /// until their deadline.
    pub fn connect(config: &PulsarConfig, error_sink: Option<ErrorSink>) -> Result<Self, StreamError> {
        config.validate()?;

        let producers = (0..config.partitions)
            .map(|i| {
                let topic = partition_topic(&config.topic, i);
                let name = format!("{}-{}-{i}", uuid::Uuid::new_v4(), config.producer_name);
                let url = pulsar::producer_url(
                    &config.broker_url,
                    &config.tenant,
                    &config.namespace,
                    &topic,
                    &name,
                );
                info!("{name} try to create producer on topic {topic} on url: {}", config.broker_url);

                let producer = PulsarProducer::start(
                    PulsarProducerConfig {
                        url,
                        topic,
                        name,
                        partition: i,
                        connect_timeout: config.connect_timeout(),
                        initial_reconnect_delay: config.initial_reconnect_delay(),
                        max_reconnect_delay: config.max_reconnect_delay(),
                    },
                    error_sink.clone(),
                );
                Arc::new(producer) as Arc<dyn PartitionProducer>
            })
            .collect();

        Self::from_producers(producers)
    }

    /// Build a pool over existing producers; index `i` serves partition `i`.
    pub fn from_producers(producers: Vec<Arc<dyn PartitionProducer>>) -> Result<Self, StreamError> {
        if producers.is_empty() {
            return Err(StreamError::Config("producer pool needs at least one partition".into()));
        }
        let slots = producers
            .into_iter()
            .map(|producer| Slot { producer, latency: Mutex::new(LatencyCollector::new()) })
            .collect();
        Ok(Self { slots })
    }

    /// Number of partitions (N).
    pub fn partitions(&self) -> usize {
        self.slots.len()
    }

    /// Partition serving `market_id`: `market_id mod N`.
    #[inline]
    pub fn partition_for(&self, market_id: u64) -> usize {
        (market_id % self.slots.len() as u64) as usize
    }

    pub fn topic(&self, partition: usize) -> Option<&str> {
        self.slots.get(partition).map(|s| s.producer.topic())
    }

    /// Publish `payload` on `partition`, waiting no later than `deadline`.
    pub async fn publish(
        &self,
        partition: usize,
        payload: Vec<u8>,
        deadline: Instant,
    ) -> Result<MessageId, StreamError> {
        let slot = self.slots.get(partition).ok_or_else(|| StreamError::PublishFailure {
            partition,
            reason: format!("no such partition (pool has {})", self.slots.len()),
        })?;

        let started = Instant::now();
        let id = tokio::time::timeout_at(deadline, slot.producer.send(payload, deadline))
            .await
            .map_err(|_| StreamError::PublishTimeout { partition })??;
        slot.latency.lock().record(started.elapsed());
        Ok(id)
    }

    /// Per-partition latency since the previous call, as `(topic, stats)`.
    pub fn take_latency_stats(&self) -> Vec<(String, Option<LatencyStats>)> {
        self.slots
            .iter()
            .map(|s| (s.producer.topic().to_string(), s.latency.lock().take()))
            .collect()
    }

    /// Close every slot.
    pub async fn shutdown(&self) {
        for slot in &self.slots {
            slot.producer.close().await;
            info!("{} closed producer on topic {}", slot.producer.name(), slot.producer.topic());
        }
        info!("producer pool stopped ({} partitions)", self.slots.len());
    }
}
