//! Registry of game processes connected to the hosted broker
//!
//! The broker itself only knows owner ids. This module keeps the metadata
//! the server reports on (address, player name, traffic counters) and
//! enforces the connection limit.

use log::info;
use shared::broker::OwnerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected game process
#[derive(Debug)]
pub struct Client {
    /// Broker owner id, also sent back as the connection id
    pub id: OwnerId,
    pub addr: SocketAddr,
    /// Player name announced in the handshake, if any
    pub username: Option<String>,
    pub connected_at: Instant,
    /// Frames received from this client
    pub frames_in: u64,
    /// Deliveries forwarded to this client
    pub deliveries_out: u64,
}

impl Client {
    pub fn new(id: OwnerId, addr: SocketAddr, username: Option<String>) -> Self {
        Self {
            id,
            addr,
            username,
            connected_at: Instant::now(),
            frames_in: 0,
            deliveries_out: 0,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Name used in log lines
    pub fn label(&self) -> String {
        match &self.username {
            Some(username) => format!("{} ({})", username, self.addr),
            None => self.addr.to_string(),
        }
    }
}

/// Tracks connections and enforces the server's capacity
pub struct ClientManager {
    clients: HashMap<OwnerId, Client>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a connection, returns false when the server is full
    pub fn add_client(&mut self, client: Client) -> bool {
        if self.clients.len() >= self.max_clients {
            return false;
        }

        info!("Client {} connected as {}", client.id, client.label());
        self.clients.insert(client.id, client);
        true
    }

    pub fn remove_client(&mut self, id: OwnerId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        info!(
            "Client {} disconnected after {:.1}s ({} frames in, {} deliveries out)",
            client.label(),
            client.uptime().as_secs_f32(),
            client.frames_in,
            client.deliveries_out
        );
        Some(client)
    }

    pub fn get(&self, id: OwnerId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn record_frame_in(&mut self, id: OwnerId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.frames_in += 1;
        }
    }

    pub fn record_delivery_out(&mut self, id: OwnerId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.deliveries_out += 1;
        }
    }

    pub fn find_by_username(&self, username: &str) -> Option<OwnerId> {
        self.clients
            .values()
            .find(|client| client.username.as_deref() == Some(username))
            .map(|client| client.id)
    }

    /// Usernames of connected players, sorted
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .values()
            .filter_map(|client| client.username.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
