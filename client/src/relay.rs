//! Relay session state machine
//!
//! Pure translation logic between the two wires: server messages come in,
//! optional GUI snapshots go out; GUI intents come in, optional server
//! messages go out. The session tracks which phase it is in (disconnected,
//! lobby, joining, in game) and keeps local mirrors of the lobby roster and
//! the board so every snapshot it emits is complete. No sockets here, which
//! is what makes the whole state machine testable in isolation.

use log::{debug, warn};
use shared::{
    Bomb, BombId, ClientMessageGui, ClientMessageServer, Event, Game, GuiMessageClient, Hello,
    Lobby, Player, PlayerId, Position, Score, ServerMessageClient, Turn,
};
use std::collections::{BTreeMap, BTreeSet};

/// Local mirror of the running game, folded together from turn events.
///
/// Holds bombs keyed by id (the GUI wire carries no ids) and blocks as an
/// ordered set, then denormalizes both into the `Game` snapshot.
#[derive(Debug, Clone)]
struct GameMirror {
    server_name: String,
    size_x: u16,
    size_y: u16,
    game_length: u16,
    bomb_timer: u16,
    turn: u16,
    players: BTreeMap<PlayerId, Player>,
    player_positions: BTreeMap<PlayerId, Position>,
    blocks: BTreeSet<Position>,
    bombs: BTreeMap<BombId, Bomb>,
    explosions: Vec<Position>,
    scores: BTreeMap<PlayerId, Score>,
}

impl GameMirror {
    fn from_lobby(lobby: &Lobby) -> Self {
        GameMirror {
            server_name: lobby.server_name.clone(),
            size_x: lobby.size_x,
            size_y: lobby.size_y,
            game_length: lobby.game_length,
            bomb_timer: lobby.bomb_timer,
            turn: 0,
            players: lobby.players.clone(),
            player_positions: BTreeMap::new(),
            blocks: BTreeSet::new(),
            bombs: BTreeMap::new(),
            explosions: Vec::new(),
            scores: lobby.players.keys().map(|id| (*id, 0)).collect(),
        }
    }

    /// Folds one turn's events into the mirror, the client-side counterpart
    /// of the server's simulation: bomb timers tick down, then each event
    /// lands in its map. Scores count destroyed robots, once per robot per
    /// turn however many bombs caught it.
    fn apply_turn(&mut self, turn: &Turn) {
        self.turn = turn.turn;
        self.explosions.clear();
        for bomb in self.bombs.values_mut() {
            bomb.timer = bomb.timer.saturating_sub(1);
        }

        let mut destroyed = BTreeSet::new();
        for event in &turn.events {
            match event {
                Event::PlayerMoved { id, position } => {
                    self.player_positions.insert(*id, *position);
                }
                Event::BlockPlaced { position } => {
                    self.blocks.insert(*position);
                }
                Event::BombPlaced { id, position } => {
                    self.bombs.insert(
                        *id,
                        Bomb {
                            position: *position,
                            timer: self.bomb_timer,
                        },
                    );
                }
                Event::BombExploded {
                    id,
                    robots_destroyed,
                    blocks_destroyed,
                } => {
                    if let Some(bomb) = self.bombs.remove(id) {
                        self.explosions.push(bomb.position);
                    }
                    for position in blocks_destroyed {
                        self.blocks.remove(position);
                    }
                    destroyed.extend(robots_destroyed.iter().copied());
                }
            }
        }
        for id in destroyed {
            *self.scores.entry(id).or_insert(0) += 1;
        }
    }

    fn snapshot(&self) -> Game {
        Game {
            server_name: self.server_name.clone(),
            size_x: self.size_x,
            size_y: self.size_y,
            game_length: self.game_length,
            turn: self.turn,
            players: self.players.clone(),
            player_positions: self.player_positions.clone(),
            blocks: self.blocks.iter().copied().collect(),
            bombs: self.bombs.values().cloned().collect(),
            explosions: self.explosions.clone(),
            scores: self.scores.clone(),
        }
    }
}

/// Client-side session: phase flags plus the lobby and game mirrors.
#[derive(Debug)]
pub struct RelaySession {
    player_name: String,
    pub server_connected: bool,
    in_lobby: bool,
    in_game: bool,
    join_request_sent: bool,
    lobby: Option<Lobby>,
    game: Option<GameMirror>,
}

impl RelaySession {
    pub fn new(player_name: String) -> Self {
        RelaySession {
            player_name,
            server_connected: true,
            in_lobby: false,
            in_game: false,
            join_request_sent: false,
            lobby: None,
            game: None,
        }
    }

    pub fn in_lobby(&self) -> bool {
        self.in_lobby
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn mark_disconnected(&mut self) {
        self.server_connected = false;
    }

    /// Reacts to one server message; returns the snapshot to forward to the
    /// GUI, if the message was legal in the current phase and changed the
    /// view.
    pub fn handle_server_message(
        &mut self,
        message: ServerMessageClient,
    ) -> Option<ClientMessageGui> {
        match message {
            ServerMessageClient::Hello(hello) => self.handle_hello(hello),
            ServerMessageClient::AcceptedPlayer(accepted) => {
                if !self.in_lobby {
                    debug!("AcceptedPlayer outside the lobby, ignoring");
                    return None;
                }
                let lobby = self.lobby.as_mut()?;
                lobby.players.insert(accepted.id, accepted.player);
                Some(ClientMessageGui::Lobby(lobby.clone()))
            }
            ServerMessageClient::GameStarted(started) => {
                if self.in_game {
                    debug!("GameStarted while already in game, ignoring");
                    return None;
                }
                let Some(lobby) = self.lobby.as_mut() else {
                    warn!("GameStarted before Hello, ignoring");
                    return None;
                };
                for (id, player) in started.players {
                    lobby.players.insert(id, player);
                }
                self.game = Some(GameMirror::from_lobby(lobby));
                self.in_lobby = false;
                self.in_game = true;
                None
            }
            ServerMessageClient::Turn(turn) => {
                if !self.in_game {
                    debug!("Turn outside a game, ignoring");
                    return None;
                }
                let game = self.game.as_mut()?;
                game.apply_turn(&turn);
                Some(ClientMessageGui::Game(game.snapshot()))
            }
            ServerMessageClient::GameEnded(ended) => {
                if !self.in_game {
                    debug!("GameEnded outside a game, ignoring");
                    return None;
                }
                debug!("game ended with {} scored players", ended.scores.len());
                self.in_game = false;
                self.in_lobby = true;
                self.join_request_sent = false;
                self.game = None;
                let lobby = self.lobby.as_mut()?;
                lobby.players.clear();
                Some(ClientMessageGui::Lobby(lobby.clone()))
            }
        }
    }

    fn handle_hello(&mut self, hello: Hello) -> Option<ClientMessageGui> {
        if self.in_lobby || self.in_game {
            debug!("Hello on an established session, ignoring");
            return None;
        }
        let lobby = Lobby {
            server_name: hello.server_name,
            players_count: hello.players_count,
            size_x: hello.size_x,
            size_y: hello.size_y,
            game_length: hello.game_length,
            explosion_radius: hello.explosion_radius,
            bomb_timer: hello.bomb_timer,
            players: BTreeMap::new(),
        };
        self.lobby = Some(lobby.clone());
        self.game = None;
        self.in_lobby = true;
        Some(ClientMessageGui::Lobby(lobby))
    }

    /// Reacts to one GUI intent; returns the message to send to the server,
    /// if any. The first intent while in the lobby turns into the single
    /// join request; in game, intents translate one to one.
    pub fn handle_gui_message(&mut self, message: GuiMessageClient) -> Option<ClientMessageServer> {
        if self.in_lobby {
            if self.join_request_sent {
                return None;
            }
            self.join_request_sent = true;
            return Some(ClientMessageServer::Join {
                name: self.player_name.clone(),
            });
        }
        if !self.in_game {
            debug!("GUI intent while not in a game, dropping");
            return None;
        }
        Some(match message {
            GuiMessageClient::PlaceBomb => ClientMessageServer::PlaceBomb,
            GuiMessageClient::PlaceBlock => ClientMessageServer::PlaceBlock,
            GuiMessageClient::Move { direction } => ClientMessageServer::Move { direction },
        })
    }
}
