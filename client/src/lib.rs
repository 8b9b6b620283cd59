//! # Peril Game Client Library
//!
//! Client-side implementation of Peril, a multiplayer conquest game in which
//! players never talk to each other directly. Every client keeps its own view
//! of the map and reacts to messages consumed from the broker hosted by the
//! server: pause broadcasts, army moves from other players, and war
//! recognitions.
//!
//! ## Architecture Overview
//!
//! ### Local State
//! Each client owns a `GameState` holding its own armies and the last known
//! position of everyone else's. The REPL and every subscription handler share
//! it through a single async lock and hold that lock for the whole
//! read-modify-write of a message.
//!
//! ### Convergence Without Coordination
//! When a move lands on a territory we hold, we publish a war recognition
//! carrying the mover's snapshot and our own. Other clients only record the
//! move. The
//! recognition sits on one durable queue shared by every client. Whichever
//! client consumes it resolves the battle from the snapshots alone, so the
//! attacker and the defender reach the same verdict independently.
//!
//! ### At-Least-Once Delivery
//! Handlers never acknowledge messages themselves. They return an `AckType`
//! and the subscription loop settles the delivery with it:
//! - acknowledge when the message was applied
//! - requeue when another client should see it or a follow-up publish failed
//! - discard when redelivering it can never help
//!
//! Redelivery is harmless: a client treats a war it already settled, or one
//! where its army is already gone, as `NoUnits`. A war only changes local
//! state once its game log entry is published.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The local map: spawning, moving, per-player snapshots.
//!
//! ### Moves Module (`moves`)
//! Classifies incoming army moves as our own echo, a peaceful move or a war.
//!
//! ### War Module (`war`)
//! Scores battles and applies the outcome to the local map.
//!
//! ### Handlers Module (`handlers`)
//! Maps every outcome onto exactly one acknowledgement and wires the three
//! subscriptions a player needs.
//!
//! ### Input, Commands and Rendering (`input`, `commands`, `rendering`)
//! The text REPL: parsing lines, executing commands, printing status.
//!
//! ### Network Module (`network`)
//! `RemoteChannel`, the TCP connection to the server's broker.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::game::GameState;
//! use client::handlers::spawn_subscriptions;
//! use client::network::RemoteChannel;
//! use shared::Transport;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = Arc::new(RemoteChannel::connect("127.0.0.1:8080", Some("alice")).await?);
//! let transport: Arc<dyn Transport> = channel.clone();
//! let state = GameState::new("alice").shared();
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let subscriptions = spawn_subscriptions(state.clone(), transport, "alice", shutdown_rx)?;
//!
//! // ... run the REPL ...
//!
//! shutdown_tx.send(true)?;
//! for subscription in subscriptions {
//!     subscription.await?;
//! }
//! channel.close().await;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod error;
pub mod game;
pub mod handlers;
pub mod input;
pub mod moves;
pub mod network;
pub mod rendering;
pub mod spam;
pub mod war;

pub use error::CommandError;
pub use game::{GameState, SharedGameState};
pub use network::RemoteChannel;
