//! Pulsar WebSocket producer with auto-reconnect.
//!
//! Each [`PulsarProducer`] runs as a tokio task that:
//! 1. Connects to the broker's producer endpoint for one partition topic.
//! 2. Takes queued send requests, tags each with a sequence context and
//!    writes it as a text frame.
//! 3. Matches broker acks back to waiting callers by context.
//! 4. Answers pings.
//! 5. Reconnects with doubling backoff (initial delay, capped) on any
//!    failure. Requests in flight when the connection drops fail with
//!    `PublishFailure`; nothing is resent automatically.

pub mod frame;

use std::time::Duration;

use ahash::AHashMap;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use mkt_core::{MessageId, StreamError};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use self::frame::Ack;
use crate::producer::{ErrorSink, PartitionProducer};

/// Queue depth per partition.
const REQUEST_QUEUE_LEN: usize = 1024;

/// Pending-ack table size above which abandoned entries are pruned.
const PENDING_PRUNE_THRESHOLD: usize = 4096;

type Reply = oneshot::Sender<Result<MessageId, StreamError>>;

/// Build the producer endpoint URL for a persistent topic.
pub fn producer_url(broker_url: &str, tenant: &str, namespace: &str, topic: &str, producer_name: &str) -> String {
    format!(
        "{}/ws/v2/producer/persistent/{tenant}/{namespace}/{topic}?producerName={}",
        broker_url.trim_end_matches('/'),
        urlencoding::encode(producer_name),
    )
}

/// Connection settings for one partition.
#[derive(Debug, Clone)]
pub struct PulsarProducerConfig {
    /// Full producer endpoint URL (see [`producer_url`]).
    pub url: String,
    pub topic: String,
    pub name: String,
    pub partition: usize,
    pub connect_timeout: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

struct SendRequest {
    payload: Vec<u8>,
    deadline: Instant,
    reply: Reply,
}

/// A single-partition producer managed by a background tokio task.
pub struct PulsarProducer {
    topic: String,
    name: String,
    partition: usize,
    request_tx: mpsc::Sender<SendRequest>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PulsarProducer {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn start(config: PulsarProducerConfig, error_sink: Option<ErrorSink>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_LEN);
        let topic = config.topic.clone();
        let name = config.name.clone();
        let partition = config.partition;

        let task = tokio::spawn(async move {
            connection_loop(config, request_rx, shutdown_rx, error_sink).await;
        });

        Self { topic, name, partition, request_tx, shutdown_tx, task: Mutex::new(Some(task)) }
    }
}

#[async_trait]
impl PartitionProducer for PulsarProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: Vec<u8>, deadline: Instant) -> Result<MessageId, StreamError> {
        let partition = self.partition;
        let (reply, ack) = oneshot::channel();
        self.request_tx
            .send(SendRequest { payload, deadline, reply })
            .await
            .map_err(|_| StreamError::PublishFailure { partition, reason: "producer closed".into() })?;
        ack.await
            .map_err(|_| StreamError::PublishFailure { partition, reason: "producer dropped request".into() })?
    }

    async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

fn report(sink: &Option<ErrorSink>, err: StreamError) {
    if let Some(sink) = sink {
        let _ = sink.send(err);
    }
}

fn fail_pending(pending: &mut AHashMap<String, Reply>, partition: usize, reason: &str) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(StreamError::PublishFailure { partition, reason: reason.to_string() }));
    }
}

fn resolve_ack(ack: Ack, pending: &mut AHashMap<String, Reply>, partition: usize) {
    let Some(reply) = pending.remove(ack.context()) else {
        debug!("[partition-{partition}] ack for unknown context {}", ack.context());
        return;
    };
    let result = match ack {
        Ack::Ok { message_id, .. } => Ok(MessageId(message_id)),
        Ack::Rejected { reason, .. } => Err(StreamError::PublishFailure { partition, reason }),
    };
    let _ = reply.send(result);
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(config: &PulsarProducerConfig) -> Result<WsStream, String> {
    match tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(config.url.as_str())).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {:?}", config.connect_timeout)),
    }
}

/// Main connection loop — connects, pumps requests, matches acks, reconnects.
async fn connection_loop(
    config: PulsarProducerConfig,
    mut requests: mpsc::Receiver<SendRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
    error_sink: Option<ErrorSink>,
) {
    let partition = config.partition;
    let label = &config.name;
    let mut backoff = config.initial_reconnect_delay;
    let mut seq: u64 = 0;

    loop {
        if *shutdown_rx.borrow() {
            info!("[{label}] shutdown requested");
            return;
        }

        info!("[{label}] connecting to {}", config.topic);
        let stream = match connect(&config).await {
            Ok(s) => {
                backoff = config.initial_reconnect_delay;
                info!("[{label}] connected");
                s
            }
            Err(reason) => {
                error!("[{label}] connection failed: {reason}, retrying in {backoff:?}");
                report(&error_sink, StreamError::PublishFailure { partition, reason });
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(config.max_reconnect_delay);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = stream.split();
        let mut pending: AHashMap<String, Reply> = AHashMap::new();

        let reason = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("[{label}] shutdown signal received");
                    let _ = ws_write.close().await;
                    fail_pending(&mut pending, partition, "producer shut down");
                    return;
                }

                msg = ws_read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match frame::parse_ack(&text) {
                        Some(ack) => resolve_ack(ack, &mut pending, partition),
                        None => debug!("[{label}] ignoring frame: {}", text.as_str()),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => break "received close frame".to_string(),
                    Some(Err(e)) => break format!("read error: {e}"),
                    None => break "stream ended".to_string(),
                    _ => {}
                },

                req = requests.recv() => {
                    let Some(req) = req else {
                        // Every handle is gone; nobody can send any more.
                        let _ = ws_write.close().await;
                        return;
                    };
                    if req.reply.is_closed() || Instant::now() >= req.deadline {
                        continue;
                    }
                    seq += 1;
                    let context = seq.to_string();
                    let text = frame::encode_send(&req.payload, &context);
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        let reason = format!("send error: {e}");
                        let _ = req.reply.send(Err(StreamError::PublishFailure { partition, reason: reason.clone() }));
                        break reason;
                    }
                    pending.insert(context, req.reply);
                    if pending.len() > PENDING_PRUNE_THRESHOLD {
                        pending.retain(|_, reply| !reply.is_closed());
                    }
                }
            }
        };

        let in_flight = pending.len();
        fail_pending(&mut pending, partition, "connection lost");
        warn!("[{label}] disconnected ({reason}), {in_flight} in flight failed, reconnecting in {backoff:?}");
        report(&error_sink, StreamError::PublishFailure { partition, reason });

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(config.max_reconnect_delay);
    }
}
