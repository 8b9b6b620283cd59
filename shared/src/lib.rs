//! # Shared game protocol
//!
//! Types and plumbing used by both the game clients and the server. Clients
//! and the server never talk to each other directly; every interaction is a
//! message published on a broker exchange and consumed from a queue.
//!
//! ## Modules
//!
//! - `model`: players, units, territories and the events built from them
//! - `routing`: exchange names, routing keys and topic pattern matching
//! - `codec`: JSON for game events, bincode for game logs
//! - `pubsub`: the delivery contract (`AckType`) and the subscription loop
//! - `broker`: an in-memory broker with durable and transient queues
//! - `wire`: framing used to reach a broker hosted in another process

pub mod broker;
pub mod codec;
pub mod error;
pub mod model;
pub mod pubsub;
pub mod routing;
pub mod wire;

pub use broker::{Broker, BrokerChannel, ExchangeKind, QueueStats};
pub use codec::Encoding;
pub use error::PubSubError;
pub use model::{
    GameLogEntry, MoveEvent, PlayerSnapshot, PlayingState, Rank, Territory, Unit, WarRecognition,
};
pub use pubsub::{AckType, Delivery, QueueSpec, QueueType, Transport};
