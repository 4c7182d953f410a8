//! TCP connection registry for the server
//!
//! Tracks every live connection, the writer channel feeding its socket task,
//! and the player id bound to it after a successful join. Owned exclusively
//! by the main server loop; the per-connection tasks only ever see their own
//! channel ends.

use log::{debug, info};
use shared::{PlayerId, ServerMessageClient};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// One live client connection.
#[derive(Debug)]
pub struct Connection {
    pub addr: SocketAddr,
    /// Feeds the connection's writer task; messages are encoded there.
    pub sender: mpsc::UnboundedSender<ServerMessageClient>,
    /// Set once this connection's Join is accepted.
    pub player_id: Option<PlayerId>,
}

/// Registry of live connections, keyed by a process-local connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<u64, Connection>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            connections: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers a new connection and returns its id.
    pub fn add(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerMessageClient>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(
            id,
            Connection {
                addr,
                sender,
                player_id: None,
            },
        );
        info!("connection {} opened from {}", id, addr);
        id
    }

    pub fn remove(&mut self, id: u64) {
        if let Some(connection) = self.connections.remove(&id) {
            info!("connection {} from {} closed", id, connection.addr);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn addr_of(&self, id: u64) -> Option<SocketAddr> {
        self.connections.get(&id).map(|connection| connection.addr)
    }

    /// Player bound to this connection, if it has joined.
    pub fn player_of(&self, id: u64) -> Option<PlayerId> {
        self.connections.get(&id).and_then(|connection| connection.player_id)
    }

    pub fn bind_player(&mut self, id: u64, player_id: PlayerId) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.player_id = Some(player_id);
        }
    }

    /// Drops all player bindings; used when a game ends and the lobby reopens.
    pub fn clear_players(&mut self) {
        for connection in self.connections.values_mut() {
            connection.player_id = None;
        }
    }

    /// Queues a message for one connection. A closed channel just means the
    /// writer task is gone; the reader will report the disconnect shortly.
    pub fn send(&self, id: u64, message: ServerMessageClient) {
        if let Some(connection) = self.connections.get(&id) {
            if connection.sender.send(message).is_err() {
                debug!("connection {} writer already gone", id);
            }
        }
    }

    /// Queues a message for every live connection.
    pub fn broadcast(&self, message: &ServerMessageClient) {
        for (id, connection) in &self.connections {
            if connection.sender.send(message.clone()).is_err() {
                debug!("connection {} writer already gone", id);
            }
        }
    }
}
