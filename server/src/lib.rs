//! # Peril Server Library
//!
//! The server hosts the message broker every Peril client connects to and
//! plays a few roles of its own on top of it. It never holds game state:
//! clients converge on the map by themselves through the messages they
//! exchange.
//!
//! ## Core Responsibilities
//!
//! ### Broker Hosting
//! An in-memory broker from the shared crate is exposed over TCP. Each
//! connection is one broker channel; closing the connection requeues every
//! delivery it had not settled and removes its transient queues once they
//! have no consumers left.
//!
//! ### Game Administration
//! The operator pauses and resumes the game from the server REPL. The
//! playing state is broadcast on the direct exchange to each player's pause
//! queue. `status` lists the connected players; a player name can only be
//! connected once.
//!
//! ### Game Log
//! Log entries published by clients after every war are consumed from the
//! durable `game_logs` queue and appended to a file. A failed write requeues
//! the entry.
//!
//! ### Observation
//! A transient queue bound to every war recognition logs wars as they are
//! declared, and the dead-letter queue logs deliveries clients dropped.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! `BrokerServer`: TCP accept loop, handshake, per-connection reader,
//! delivery pumps and writer.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection registry with the capacity limit and per-connection counters.
//!
//! ### Game Log Module (`game_log`)
//! Append-only log file writer and its subscription handler.
//!
//! ### Observers Module (`observers`)
//! The server's own subscriptions: game log, war observer, dead letters.
//!
//! ### Admin Module (`admin`)
//! REPL commands, the connected players report and the pause broadcast.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game_log::GameLogWriter;
//! use server::network::BrokerServer;
//! use server::observers::spawn_observers;
//! use shared::{Broker, Transport};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Broker::with_game_exchanges();
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let local: Arc<dyn Transport> = Arc::new(broker.channel());
//!     let writer = Arc::new(GameLogWriter::new("game.log"));
//!     spawn_observers(local, writer, shutdown_rx.clone())?;
//!
//!     let server = BrokerServer::bind("127.0.0.1:8080", broker, 32).await?;
//!     server.run(shutdown_rx).await;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod client_manager;
pub mod game_log;
pub mod network;
pub mod observers;
