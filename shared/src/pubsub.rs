//! Delivery contract between the game logic and the broker.
//!
//! Handlers never touch broker acknowledgements directly. Each handler returns
//! an [`AckType`] and the subscription loop settles the delivery with it, so
//! every branch of every handler ends in exactly one of ack, requeue or discard.

use crate::codec::Encoding;
use crate::error::PubSubError;
use crate::model::GameLogEntry;
use crate::routing::{user_key, EXCHANGE_TOPIC, GAME_LOG_SLUG};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How a delivery is settled once its handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckType {
    Ack,
    NackRequeue,
    NackDiscard,
}

/// Durable queues survive consumer disconnects, transient ones are removed
/// together with their last consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueType {
    Durable,
    Transient,
}

/// A message handed to a consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub queue: String,
    pub delivery_tag: u64,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

/// Queue declaration plus the binding it consumes through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub exchange: String,
    pub queue: String,
    pub binding_key: String,
    pub queue_type: QueueType,
}

impl QueueSpec {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        binding_key: impl Into<String>,
        queue_type: QueueType,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            binding_key: binding_key.into(),
            queue_type,
        }
    }
}

/// Operations the game needs from a broker connection.
///
/// Every method is non-blocking. Implementations serialize outbound traffic
/// so concurrent handlers can publish through one shared transport.
pub trait Transport: Send + Sync + 'static {
    /// `Ok` means the broker accepted the message for routing, or for a
    /// remote transport that the frame was queued on the connection. Frames
    /// are written in order, so a lost connection fails every later call.
    fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>)
        -> Result<(), PubSubError>;

    fn declare_and_bind(&self, spec: &QueueSpec) -> Result<(), PubSubError>;

    fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, PubSubError>;

    fn settle(&self, delivery: &Delivery, ack: AckType) -> Result<(), PubSubError>;
}

pub fn publish_json<T: Serialize>(
    transport: &dyn Transport,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PubSubError> {
    let body = Encoding::Json.encode(value)?;
    transport.publish(exchange, routing_key, body)
}

pub fn publish_binary<T: Serialize>(
    transport: &dyn Transport,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PubSubError> {
    let body = Encoding::Binary.encode(value)?;
    transport.publish(exchange, routing_key, body)
}

/// Publishes a game log entry on `game_logs.<username>`.
///
/// A failed publish asks for the triggering delivery to be retried so the
/// log entry is produced again on redelivery.
pub fn publish_game_log(transport: &dyn Transport, username: &str, message: &str) -> AckType {
    let entry = GameLogEntry {
        timestamp: get_timestamp(),
        username: username.to_string(),
        message: message.to_string(),
    };

    match publish_binary(
        transport,
        EXCHANGE_TOPIC,
        &user_key(GAME_LOG_SLUG, username),
        &entry,
    ) {
        Ok(()) => AckType::Ack,
        Err(e) => {
            error!("Failed to publish game log for {}: {}", username, e);
            AckType::NackRequeue
        }
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

pub fn subscribe_json<T, F, Fut>(
    transport: Arc<dyn Transport>,
    spec: QueueSpec,
    shutdown: watch::Receiver<bool>,
    handler: F,
) -> Result<JoinHandle<()>, PubSubError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send,
{
    subscribe(transport, spec, Encoding::Json, shutdown, handler)
}

pub fn subscribe_binary<T, F, Fut>(
    transport: Arc<dyn Transport>,
    spec: QueueSpec,
    shutdown: watch::Receiver<bool>,
    handler: F,
) -> Result<JoinHandle<()>, PubSubError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send,
{
    subscribe(transport, spec, Encoding::Binary, shutdown, handler)
}

/// Declares the queue, starts consuming and spawns the delivery loop.
///
/// Deliveries are decoded before dispatch. A body that fails to decode is
/// discarded since redelivering the same bytes cannot succeed. Once
/// `shutdown` flips to true the loop stops taking new deliveries; a handler
/// already running is allowed to finish and settle.
pub fn subscribe<T, F, Fut>(
    transport: Arc<dyn Transport>,
    spec: QueueSpec,
    encoding: Encoding,
    mut shutdown: watch::Receiver<bool>,
    handler: F,
) -> Result<JoinHandle<()>, PubSubError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send,
{
    transport.declare_and_bind(&spec)?;
    let mut deliveries = transport.consume(&spec.queue)?;
    info!(
        "Subscribed to {} ({} on {})",
        spec.queue, spec.binding_key, spec.exchange
    );

    let handle = tokio::spawn(async move {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delivery = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let ack = match encoding.decode::<T>(&delivery.body) {
                Ok(value) => handler(value).await,
                Err(e) => {
                    warn!(
                        "Discarding malformed delivery {} on {}: {}",
                        delivery.delivery_tag, delivery.queue, e
                    );
                    AckType::NackDiscard
                }
            };

            match ack {
                AckType::Ack => debug!("Ack {} on {}", delivery.delivery_tag, delivery.queue),
                AckType::NackRequeue => {
                    debug!("Nack and requeue {} on {}", delivery.delivery_tag, delivery.queue)
                }
                AckType::NackDiscard => {
                    debug!("Nack and discard {} on {}", delivery.delivery_tag, delivery.queue)
                }
            }

            if let Err(e) = transport.settle(&delivery, ack) {
                error!(
                    "Failed to settle delivery {} on {}: {}",
                    delivery.delivery_tag, delivery.queue, e
                );
                if e.is_transient() {
                    break;
                }
            }
        }

        info!("Subscription to {} stopped", spec.queue);
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::model::PlayingState;
    use crate::routing::{EXCHANGE_DIRECT, PAUSE_KEY};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    fn pause_spec() -> QueueSpec {
        QueueSpec::new(EXCHANGE_DIRECT, "pause.alice", PAUSE_KEY, QueueType::Transient)
    }

    #[tokio::test]
    async fn test_handler_ack_settles_delivery() {
        let broker = Broker::with_game_exchanges();
        let channel = Arc::new(broker.channel());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        subscribe_json(channel.clone(), pause_spec(), shutdown_rx, move |ps: PlayingState| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(ps.is_paused);
                AckType::Ack
            }
        })
        .unwrap();

        publish_json(channel.as_ref(), EXCHANGE_DIRECT, PAUSE_KEY, &PlayingState { is_paused: true })
            .unwrap();

        let seen = timeout(Duration::from_secs(1), seen_rx.recv()).await.unwrap();
        assert_eq!(seen, Some(true));

        sleep(Duration::from_millis(20)).await;
        let stats = broker.queue_stats("pause.alice").unwrap();
        assert_eq!(stats.unacked, 0);
        assert_eq!(stats.ready, 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_discarded_without_stopping() {
        let broker = Broker::with_game_exchanges();
        let channel = Arc::new(broker.channel());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        subscribe_json(channel.clone(), pause_spec(), shutdown_rx, move |_: PlayingState| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                AckType::Ack
            }
        })
        .unwrap();

        channel
            .publish(EXCHANGE_DIRECT, PAUSE_KEY, b"definitely not json".to_vec())
            .unwrap();
        publish_json(channel.as_ref(), EXCHANGE_DIRECT, PAUSE_KEY, &PlayingState { is_paused: false })
            .unwrap();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.queue_stats("pause.alice").unwrap().unacked, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_taking_deliveries() {
        let broker = Broker::with_game_exchanges();
        let channel = Arc::new(broker.channel());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = subscribe_json(channel.clone(), pause_spec(), shutdown_rx, |_: PlayingState| async {
            AckType::Ack
        })
        .unwrap();

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

        publish_json(channel.as_ref(), EXCHANGE_DIRECT, PAUSE_KEY, &PlayingState { is_paused: true })
            .unwrap();
        let stats = broker.queue_stats("pause.alice").unwrap();
        assert_eq!(stats.ready + stats.unacked, 1);
    }

    #[test]
    fn test_publish_game_log_maps_failure_to_requeue() {
        let broker = Broker::new();
        let channel = broker.channel();
        assert_eq!(publish_game_log(&channel, "alice", "hello"), AckType::NackRequeue);

        let broker = Broker::with_game_exchanges();
        let channel = broker.channel();
        assert_eq!(publish_game_log(&channel, "alice", "hello"), AckType::Ack);
    }
}
