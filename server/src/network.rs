//! Server network layer: TCP connection handling and game loop coordination
//!
//! One reader and one writer task per connection, both funneled through
//! channels into a single main loop that owns the engine and the connection
//! registry. The loop multiplexes three sources with `tokio::select!`: new
//! connections, decoded client messages, and the turn timer. Because the
//! engine is only ever touched from this loop, the authoritative state has
//! exactly one writer and needs no locks.

use crate::connections::ConnectionRegistry;
use crate::engine::Engine;
use log::{debug, error, info, warn};
use shared::{ClientMessageServer, Decode, Encode, Player, ServerMessageClient};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Messages sent from connection tasks to the main server loop.
#[derive(Debug)]
enum ServerEvent {
    MessageReceived {
        conn_id: u64,
        message: ClientMessageServer,
    },
    Disconnected {
        conn_id: u64,
    },
}

/// Main server coordinating networking and the turn simulation.
pub struct Server {
    listener: TcpListener,
    engine: Engine,
    registry: ConnectionRegistry,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    /// Binds the listener on the configured port and prepares an empty lobby.
    pub async fn new(engine: Engine) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(("0.0.0.0", engine.settings().port)).await?;
        info!("server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            engine,
            registry: ConnectionRegistry::new(),
            event_tx,
            event_rx,
        })
    }

    /// The bound listener address; the port is ephemeral when configured as 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Main server loop coordinating all operations. Runs until the process
    /// is stopped; in-flight reads and writes are simply abandoned then.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut turn_interval = interval(Duration::from_millis(
            self.engine.settings().turn_duration,
        ));
        turn_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.handle_connect(stream, addr),
                        Err(e) => warn!("failed to accept connection: {}", e),
                    }
                },

                event = self.event_rx.recv() => {
                    // The loop holds its own sender, so recv can't return None.
                    if let Some(event) = event {
                        let game_started = self.handle_event(event);
                        if game_started {
                            // Give the first turn a full period.
                            turn_interval.reset();
                        }
                    }
                },

                _ = turn_interval.tick() => {
                    self.handle_tick();
                },
            }
        }
    }

    /// Splits a fresh connection into reader and writer tasks, registers it,
    /// and replays the session context the newcomer missed.
    fn handle_connect(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY for {}: {}", addr, e);
        }
        let (read_half, write_half) = stream.into_split();
        let (sender, receiver) = mpsc::unbounded_channel();
        let conn_id = self.registry.add(addr, sender);

        spawn_writer(write_half, receiver, conn_id);
        spawn_reader(read_half, self.event_tx.clone(), conn_id);

        self.registry
            .send(conn_id, ServerMessageClient::Hello(self.engine.hello()));

        if self.engine.is_active() {
            // Late joiner: current roster plus the full turn history.
            self.registry.send(
                conn_id,
                ServerMessageClient::GameStarted(shared::GameStarted {
                    players: self.engine.state().players.clone(),
                }),
            );
            for turn in self.engine.completed_turns() {
                self.registry
                    .send(conn_id, ServerMessageClient::Turn(turn.clone()));
            }
        } else {
            for accepted in self.engine.accepted_players() {
                self.registry.send(
                    conn_id,
                    ServerMessageClient::AcceptedPlayer(accepted.clone()),
                );
            }
        }
    }

    /// Reacts to one connection event. Returns true when this event started
    /// the game, so the caller can restart the turn timer.
    fn handle_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::MessageReceived { conn_id, message } => {
                self.handle_message(conn_id, message)
            }
            ServerEvent::Disconnected { conn_id } => {
                self.registry.remove(conn_id);
                false
            }
        }
    }

    fn handle_message(&mut self, conn_id: u64, message: ClientMessageServer) -> bool {
        match message {
            ClientMessageServer::Join { name } => self.handle_join(conn_id, name),
            intent => {
                match self.registry.player_of(conn_id) {
                    Some(player_id) if self.engine.is_active() => {
                        self.engine.record_intent(player_id, intent);
                    }
                    Some(_) => debug!("intent from connection {} outside a game", conn_id),
                    None => debug!("intent from connection {} before joining", conn_id),
                }
                false
            }
        }
    }

    fn handle_join(&mut self, conn_id: u64, name: String) -> bool {
        if self.engine.is_active() {
            debug!("join from connection {} during an active game", conn_id);
            return false;
        }
        if self.registry.player_of(conn_id).is_some() {
            debug!("repeated join from connection {}", conn_id);
            return false;
        }
        let Some(addr) = self.registry.addr_of(conn_id) else {
            return false;
        };

        let player = Player {
            name,
            address: addr.to_string(),
        };
        match self.engine.add_player(player) {
            Ok(accepted) => {
                self.registry.bind_player(conn_id, accepted.id);
                self.registry
                    .broadcast(&ServerMessageClient::AcceptedPlayer(accepted));

                if self.engine.is_full() {
                    let started = self.engine.start_game();
                    self.registry
                        .broadcast(&ServerMessageClient::GameStarted(started));
                    return true;
                }
            }
            Err(e) => warn!("rejected join from connection {}: {}", conn_id, e),
        }
        false
    }

    /// One turn timer tick: advance the simulation and broadcast the result.
    /// After the final turn, close the game out and reopen the lobby.
    fn handle_tick(&mut self) {
        if !self.engine.is_active() {
            return;
        }

        let turn = self.engine.simulate_turn();
        let game_over = turn.turn >= self.engine.settings().game_length;
        debug!("simulated turn {} ({} events)", turn.turn, turn.events.len());
        self.registry.broadcast(&ServerMessageClient::Turn(turn));

        if game_over {
            let ended = self.engine.end_game();
            self.registry
                .broadcast(&ServerMessageClient::GameEnded(ended));
            self.engine.reset();
            self.registry.clear_players();
            info!("lobby reopened");
        }
    }
}

/// Drains the connection's outgoing queue onto its socket. A failed write
/// means the peer is gone; the reader task reports the disconnect.
fn spawn_writer(
    mut write_half: OwnedWriteHalf,
    mut receiver: mpsc::UnboundedReceiver<ServerMessageClient>,
    conn_id: u64,
) {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let bytes = message.to_bytes();
            if let Err(e) = write_half.write_all(&bytes).await {
                error!("failed to send to connection {}: {}", conn_id, e);
                break;
            }
        }
    });
}

/// Decodes client messages off the socket until the stream ends or turns
/// malformed; either way the connection is reported closed and abandoned.
fn spawn_reader(
    mut read_half: OwnedReadHalf,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    conn_id: u64,
) {
    tokio::spawn(async move {
        loop {
            match ClientMessageServer::decode(&mut read_half).await {
                Ok(message) => {
                    if event_tx
                        .send(ServerEvent::MessageReceived { conn_id, message })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    debug!("connection {} stream ended: {}", conn_id, e);
                    let _ = event_tx.send(ServerEvent::Disconnected { conn_id });
                    break;
                }
            }
        }
    });
}
