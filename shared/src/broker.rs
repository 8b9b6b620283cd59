//! In-memory message broker.
//!
//! Exchanges route published messages into queues through bindings. Queues
//! hand messages to their consumers round-robin and keep every delivery in an
//! unacknowledged set until the consumer settles it. Requeued deliveries come
//! back flagged as redelivered; discarded ones are forwarded to the queue's
//! dead-letter exchange when it has one.
//!
//! Consumers belong to an owner (one per connection). Closing an owner drops
//! its consumers and requeues everything it had not settled, which is what
//! gives the game at-least-once delivery across client restarts.

use crate::error::PubSubError;
use crate::pubsub::{AckType, Delivery, QueueSpec, QueueType, Transport};
use crate::routing::{
    topic_matches, EXCHANGE_DEAD_LETTER, EXCHANGE_DIRECT, EXCHANGE_TOPIC,
};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Identifies the connection a consumer or delivery belongs to
pub type OwnerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Topic,
    Fanout,
}

impl ExchangeKind {
    fn matches(&self, binding_key: &str, routing_key: &str) -> bool {
        match self {
            ExchangeKind::Direct => binding_key == routing_key,
            ExchangeKind::Topic => topic_matches(binding_key, routing_key),
            ExchangeKind::Fanout => true,
        }
    }
}

#[derive(Debug)]
struct Binding {
    queue: String,
    key: String,
}

#[derive(Debug)]
struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<Binding>,
}

#[derive(Debug, Clone)]
struct Message {
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct Consumer {
    owner: OwnerId,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug)]
struct Queue {
    queue_type: QueueType,
    dead_letter_exchange: Option<String>,
    ready: VecDeque<Message>,
    unacked: HashMap<u64, (OwnerId, Message)>,
    consumers: Vec<Consumer>,
    next_consumer: usize,
}

impl Queue {
    fn new(queue_type: QueueType, dead_letter_exchange: Option<String>) -> Self {
        Self {
            queue_type,
            dead_letter_exchange,
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            consumers: Vec::new(),
            next_consumer: 0,
        }
    }

    /// Hands ready messages to consumers until one side runs out
    fn dispatch(&mut self, name: &str, next_tag: &mut u64) {
        while !self.consumers.is_empty() {
            let Some(message) = self.ready.pop_front() else {
                break;
            };

            let index = self.next_consumer % self.consumers.len();
            let tag = *next_tag;
            let delivery = Delivery {
                queue: name.to_string(),
                delivery_tag: tag,
                routing_key: message.routing_key.clone(),
                body: message.body.clone(),
                redelivered: message.redelivered,
            };

            let consumer = &self.consumers[index];
            if consumer.sender.send(delivery).is_err() {
                debug!("Dropping closed consumer on {}", name);
                self.consumers.remove(index);
                self.ready.push_front(message);
                continue;
            }

            *next_tag += 1;
            self.unacked.insert(tag, (consumer.owner, message));
            self.next_consumer = index + 1;
        }
    }
}

#[derive(Debug, Default)]
struct BrokerInner {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    next_tag: u64,
    next_owner: OwnerId,
}

impl BrokerInner {
    fn route(&mut self, exchange: &str, routing_key: &str, body: Vec<u8>, redelivered: bool) -> Result<usize, PubSubError> {
        let target = self
            .exchanges
            .get(exchange)
            .ok_or_else(|| PubSubError::UnknownExchange {
                exchange: exchange.to_string(),
            })?;

        let mut matched: Vec<String> = Vec::new();
        for binding in &target.bindings {
            if target.kind.matches(&binding.key, routing_key) && !matched.contains(&binding.queue) {
                matched.push(binding.queue.clone());
            }
        }

        let BrokerInner {
            queues, next_tag, ..
        } = self;

        let mut routed = 0;
        for name in matched {
            if let Some(queue) = queues.get_mut(&name) {
                queue.ready.push_back(Message {
                    routing_key: routing_key.to_string(),
                    body: body.clone(),
                    redelivered,
                });
                queue.dispatch(&name, next_tag);
                routed += 1;
            }
        }

        if routed == 0 {
            debug!("Unroutable message on {} with key {}", exchange, routing_key);
        }

        Ok(routed)
    }

    fn dispatch_all(&mut self) {
        let BrokerInner {
            queues, next_tag, ..
        } = self;
        for (name, queue) in queues.iter_mut() {
            queue.dispatch(name, next_tag);
        }
    }
}

/// Snapshot of a queue's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub unacked: usize,
    pub consumers: usize,
}

/// Shared handle to the broker state
#[derive(Debug, Clone, Default)]
pub struct Broker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker with the direct, topic and dead-letter exchanges the game uses
    pub fn with_game_exchanges() -> Self {
        let broker = Self::new();
        broker.declare_exchange(EXCHANGE_DIRECT, ExchangeKind::Direct);
        broker.declare_exchange(EXCHANGE_TOPIC, ExchangeKind::Topic);
        broker.declare_exchange(EXCHANGE_DEAD_LETTER, ExchangeKind::Fanout);
        broker
    }

    fn lock(&self) -> MutexGuard<'_, BrokerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn declare_exchange(&self, name: &str, kind: ExchangeKind) {
        let mut inner = self.lock();
        inner.exchanges.entry(name.to_string()).or_insert_with(|| {
            info!("Declared {:?} exchange {}", kind, name);
            Exchange {
                kind,
                bindings: Vec::new(),
            }
        });
    }

    /// Declares the queue if missing and binds it to the exchange.
    ///
    /// Queues dead-letter into `peril_dlx` when that exchange exists, except
    /// queues bound to it directly.
    pub fn declare_and_bind(&self, spec: &QueueSpec) -> Result<(), PubSubError> {
        let mut inner = self.lock();

        if !inner.exchanges.contains_key(&spec.exchange) {
            return Err(PubSubError::UnknownExchange {
                exchange: spec.exchange.clone(),
            });
        }

        let dead_letter_exchange = (spec.exchange != EXCHANGE_DEAD_LETTER
            && inner.exchanges.contains_key(EXCHANGE_DEAD_LETTER))
        .then(|| EXCHANGE_DEAD_LETTER.to_string());

        match inner.queues.get(&spec.queue) {
            Some(existing) if existing.queue_type != spec.queue_type => {
                return Err(PubSubError::QueueTypeMismatch {
                    queue: spec.queue.clone(),
                });
            }
            Some(_) => {}
            None => {
                info!("Declared {:?} queue {}", spec.queue_type, spec.queue);
                inner.queues.insert(
                    spec.queue.clone(),
                    Queue::new(spec.queue_type, dead_letter_exchange),
                );
            }
        }

        if let Some(exchange) = inner.exchanges.get_mut(&spec.exchange) {
            let already_bound = exchange
                .bindings
                .iter()
                .any(|b| b.queue == spec.queue && b.key == spec.binding_key);
            if !already_bound {
                exchange.bindings.push(Binding {
                    queue: spec.queue.clone(),
                    key: spec.binding_key.clone(),
                });
            }
        }

        Ok(())
    }

    /// Routes a message and returns how many queues received it
    pub fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<usize, PubSubError> {
        self.lock().route(exchange, routing_key, body, false)
    }

    pub fn consume(&self, owner: OwnerId, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, PubSubError> {
        let mut inner = self.lock();
        let BrokerInner {
            queues, next_tag, ..
        } = &mut *inner;

        let target = queues.get_mut(queue).ok_or_else(|| PubSubError::UnknownQueue {
            queue: queue.to_string(),
        })?;

        let (sender, receiver) = mpsc::unbounded_channel();
        target.consumers.push(Consumer { owner, sender });
        target.dispatch(queue, next_tag);

        Ok(receiver)
    }

    pub fn settle(&self, queue: &str, delivery_tag: u64, ack: AckType) -> Result<(), PubSubError> {
        let mut inner = self.lock();

        let target = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| PubSubError::UnknownQueue {
                queue: queue.to_string(),
            })?;

        let (_, mut message) =
            target
                .unacked
                .remove(&delivery_tag)
                .ok_or_else(|| PubSubError::UnknownDelivery {
                    queue: queue.to_string(),
                    delivery_tag,
                })?;

        match ack {
            AckType::Ack => {}
            AckType::NackRequeue => {
                message.redelivered = true;
                target.ready.push_back(message);
                let BrokerInner {
                    queues, next_tag, ..
                } = &mut *inner;
                if let Some(target) = queues.get_mut(queue) {
                    target.dispatch(queue, next_tag);
                }
            }
            AckType::NackDiscard => {
                if let Some(dlx) = target.dead_letter_exchange.clone() {
                    if let Err(e) = inner.route(&dlx, &message.routing_key, message.body, false) {
                        warn!("Failed to dead-letter message from {}: {}", queue, e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Allocates an owner id and returns a channel bound to it
    pub fn channel(&self) -> BrokerChannel {
        let owner = {
            let mut inner = self.lock();
            inner.next_owner += 1;
            inner.next_owner
        };
        BrokerChannel {
            broker: self.clone(),
            owner,
        }
    }

    /// Removes an owner's consumers and requeues its unsettled deliveries.
    ///
    /// Transient queues left without consumers are deleted.
    pub fn close_owner(&self, owner: OwnerId) {
        let mut inner = self.lock();
        let mut deleted = Vec::new();

        for (name, queue) in inner.queues.iter_mut() {
            let before = queue.consumers.len();
            queue.consumers.retain(|c| c.owner != owner);

            let mut returned: Vec<(u64, Message)> = Vec::new();
            queue.unacked.retain(|tag, (holder, message)| {
                if *holder == owner {
                    returned.push((*tag, message.clone()));
                    false
                } else {
                    true
                }
            });

            // Oldest delivery ends up first in line
            returned.sort_by_key(|(tag, _)| *tag);
            for (_, mut message) in returned.into_iter().rev() {
                message.redelivered = true;
                queue.ready.push_front(message);
            }

            if queue.queue_type == QueueType::Transient
                && before > 0
                && queue.consumers.is_empty()
            {
                deleted.push(name.clone());
            }
        }

        for name in &deleted {
            inner.queues.remove(name);
            for exchange in inner.exchanges.values_mut() {
                exchange.bindings.retain(|b| &b.queue != name);
            }
            info!("Deleted transient queue {}", name);
        }

        inner.dispatch_all();
    }

    pub fn queue_stats(&self, queue: &str) -> Option<QueueStats> {
        let inner = self.lock();
        inner.queues.get(queue).map(|q| QueueStats {
            ready: q.ready.len(),
            unacked: q.unacked.len(),
            consumers: q.consumers.len(),
        })
    }
}

/// A broker connection living in the same process
#[derive(Debug, Clone)]
pub struct BrokerChannel {
    broker: Broker,
    owner: OwnerId,
}

impl BrokerChannel {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Releases this channel's consumers and unsettled deliveries
    pub fn close(&self) {
        self.broker.close_owner(self.owner);
    }
}

impl Transport for BrokerChannel {
    fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<(), PubSubError> {
        self.broker.publish(exchange, routing_key, body).map(|_| ())
    }

    fn declare_and_bind(&self, spec: &QueueSpec) -> Result<(), PubSubError> {
        self.broker.declare_and_bind(spec)
    }

    fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, PubSubError> {
        self.broker.consume(self.owner, queue)
    }

    fn settle(&self, delivery: &Delivery, ack: AckType) -> Result<(), PubSubError> {
        self.broker.settle(&delivery.queue, delivery.delivery_tag, ack)
    }
}
