//! Message unions exchanged on the two wires
//!
//! Server↔client messages travel back-to-back on a TCP stream with no length
//! framing; client↔GUI messages travel one per UDP datagram. Both use the
//! codec from `crate::codec`: one u8 discriminant per union (declaration
//! order from 0) followed by the active variant's fields in declared order.

use crate::codec::{Decode, DecodeError, Encode};
use crate::types::{Bomb, Direction, Event, Player, PlayerId, Position, Score, Turn};
use std::collections::BTreeMap;
use tokio::io::AsyncRead;

/// Largest payload that fits a single UDP datagram (IPv6 practical limit).
/// Messages to the GUI must fit; they are never fragmented.
pub const MAX_UDP_DATAGRAM: usize = 65527;

/// First message on every server→client connection: the game configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub server_name: String,
    pub players_count: u8,
    pub size_x: u16,
    pub size_y: u16,
    pub game_length: u16,
    pub explosion_radius: u16,
    pub bomb_timer: u16,
}

/// Broadcast whenever the lobby accepts a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedPlayer {
    pub id: PlayerId,
    pub player: Player,
}

/// Broadcast when the lobby fills and the simulation begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStarted {
    pub players: BTreeMap<PlayerId, Player>,
}

/// Broadcast when the final turn has been simulated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEnded {
    pub scores: BTreeMap<PlayerId, Score>,
}

/// Server→client messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessageClient {
    Hello(Hello),
    AcceptedPlayer(AcceptedPlayer),
    GameStarted(GameStarted),
    Turn(Turn),
    GameEnded(GameEnded),
}

/// Client→server messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessageServer {
    Join { name: String },
    PlaceBomb,
    PlaceBlock,
    Move { direction: Direction },
}

/// Lobby snapshot forwarded to the GUI while waiting for the game to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    pub server_name: String,
    pub players_count: u8,
    pub size_x: u16,
    pub size_y: u16,
    pub game_length: u16,
    pub explosion_radius: u16,
    pub bomb_timer: u16,
    pub players: BTreeMap<PlayerId, Player>,
}

/// Game snapshot forwarded to the GUI after every applied turn.
///
/// `blocks` and `explosions` are position lists, `bombs` a list of bombs in
/// ascending-id order; the wire carries no bomb ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub server_name: String,
    pub size_x: u16,
    pub size_y: u16,
    pub game_length: u16,
    pub turn: u16,
    pub players: BTreeMap<PlayerId, Player>,
    pub player_positions: BTreeMap<PlayerId, Position>,
    pub blocks: Vec<Position>,
    pub bombs: Vec<Bomb>,
    pub explosions: Vec<Position>,
    pub scores: BTreeMap<PlayerId, Score>,
}

/// Client→GUI messages (snapshot views).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessageGui {
    Lobby(Lobby),
    Game(Game),
}

/// GUI→client messages (player intents).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuiMessageClient {
    PlaceBomb,
    PlaceBlock,
    Move { direction: Direction },
}

impl Encode for Hello {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.server_name.encode(buf);
        self.players_count.encode(buf);
        self.size_x.encode(buf);
        self.size_y.encode(buf);
        self.game_length.encode(buf);
        self.explosion_radius.encode(buf);
        self.bomb_timer.encode(buf);
    }
}

impl Decode for Hello {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Hello {
            server_name: String::decode(src).await?,
            players_count: u8::decode(src).await?,
            size_x: u16::decode(src).await?,
            size_y: u16::decode(src).await?,
            game_length: u16::decode(src).await?,
            explosion_radius: u16::decode(src).await?,
            bomb_timer: u16::decode(src).await?,
        })
    }
}

impl Encode for AcceptedPlayer {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.id.encode(buf);
        self.player.encode(buf);
    }
}

impl Decode for AcceptedPlayer {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(AcceptedPlayer {
            id: PlayerId::decode(src).await?,
            player: Player::decode(src).await?,
        })
    }
}

impl Encode for GameStarted {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.players.encode(buf);
    }
}

impl Decode for GameStarted {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(GameStarted {
            players: BTreeMap::decode(src).await?,
        })
    }
}

impl Encode for GameEnded {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.scores.encode(buf);
    }
}

impl Decode for GameEnded {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(GameEnded {
            scores: BTreeMap::decode(src).await?,
        })
    }
}

impl Encode for ServerMessageClient {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            ServerMessageClient::Hello(hello) => {
                buf.push(0);
                hello.encode(buf);
            }
            ServerMessageClient::AcceptedPlayer(accepted) => {
                buf.push(1);
                accepted.encode(buf);
            }
            ServerMessageClient::GameStarted(started) => {
                buf.push(2);
                started.encode(buf);
            }
            ServerMessageClient::Turn(turn) => {
                buf.push(3);
                turn.encode(buf);
            }
            ServerMessageClient::GameEnded(ended) => {
                buf.push(4);
                ended.encode(buf);
            }
        }
    }
}

impl Decode for ServerMessageClient {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(src).await? {
            0 => Ok(ServerMessageClient::Hello(Hello::decode(src).await?)),
            1 => Ok(ServerMessageClient::AcceptedPlayer(
                AcceptedPlayer::decode(src).await?,
            )),
            2 => Ok(ServerMessageClient::GameStarted(
                GameStarted::decode(src).await?,
            )),
            3 => Ok(ServerMessageClient::Turn(Turn::decode(src).await?)),
            4 => Ok(ServerMessageClient::GameEnded(
                GameEnded::decode(src).await?,
            )),
            other => Err(DecodeError::UnknownVariant("ServerMessageClient", other)),
        }
    }
}

impl Encode for ClientMessageServer {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            ClientMessageServer::Join { name } => {
                buf.push(0);
                name.encode(buf);
            }
            ClientMessageServer::PlaceBomb => buf.push(1),
            ClientMessageServer::PlaceBlock => buf.push(2),
            ClientMessageServer::Move { direction } => {
                buf.push(3);
                direction.encode(buf);
            }
        }
    }
}

impl Decode for ClientMessageServer {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(src).await? {
            0 => Ok(ClientMessageServer::Join {
                name: String::decode(src).await?,
            }),
            1 => Ok(ClientMessageServer::PlaceBomb),
            2 => Ok(ClientMessageServer::PlaceBlock),
            3 => Ok(ClientMessageServer::Move {
                direction: Direction::decode(src).await?,
            }),
            other => Err(DecodeError::UnknownVariant("ClientMessageServer", other)),
        }
    }
}

impl Encode for Lobby {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.server_name.encode(buf);
        self.players_count.encode(buf);
        self.size_x.encode(buf);
        self.size_y.encode(buf);
        self.game_length.encode(buf);
        self.explosion_radius.encode(buf);
        self.bomb_timer.encode(buf);
        self.players.encode(buf);
    }
}

impl Decode for Lobby {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Lobby {
            server_name: String::decode(src).await?,
            players_count: u8::decode(src).await?,
            size_x: u16::decode(src).await?,
            size_y: u16::decode(src).await?,
            game_length: u16::decode(src).await?,
            explosion_radius: u16::decode(src).await?,
            bomb_timer: u16::decode(src).await?,
            players: BTreeMap::decode(src).await?,
        })
    }
}

impl Encode for Game {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.server_name.encode(buf);
        self.size_x.encode(buf);
        self.size_y.encode(buf);
        self.game_length.encode(buf);
        self.turn.encode(buf);
        self.players.encode(buf);
        self.player_positions.encode(buf);
        self.blocks.encode(buf);
        self.bombs.encode(buf);
        self.explosions.encode(buf);
        self.scores.encode(buf);
    }
}

impl Decode for Game {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Game {
            server_name: String::decode(src).await?,
            size_x: u16::decode(src).await?,
            size_y: u16::decode(src).await?,
            game_length: u16::decode(src).await?,
            turn: u16::decode(src).await?,
            players: BTreeMap::decode(src).await?,
            player_positions: BTreeMap::decode(src).await?,
            blocks: Vec::decode(src).await?,
            bombs: Vec::decode(src).await?,
            explosions: Vec::decode(src).await?,
            scores: BTreeMap::decode(src).await?,
        })
    }
}

impl Encode for ClientMessageGui {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            ClientMessageGui::Lobby(lobby) => {
                buf.push(0);
                lobby.encode(buf);
            }
            ClientMessageGui::Game(game) => {
                buf.push(1);
                game.encode(buf);
            }
        }
    }
}

impl Decode for ClientMessageGui {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(src).await? {
            0 => Ok(ClientMessageGui::Lobby(Lobby::decode(src).await?)),
            1 => Ok(ClientMessageGui::Game(Game::decode(src).await?)),
            other => Err(DecodeError::UnknownVariant("ClientMessageGui", other)),
        }
    }
}

impl Encode for GuiMessageClient {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            GuiMessageClient::PlaceBomb => buf.push(0),
            GuiMessageClient::PlaceBlock => buf.push(1),
            GuiMessageClient::Move { direction } => {
                buf.push(2);
                direction.encode(buf);
            }
        }
    }
}

impl Decode for GuiMessageClient {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(src).await? {
            0 => Ok(GuiMessageClient::PlaceBomb),
            1 => Ok(GuiMessageClient::PlaceBlock),
            2 => Ok(GuiMessageClient::Move {
                direction: Direction::decode(src).await?,
            }),
            other => Err(DecodeError::UnknownVariant("GuiMessageClient", other)),
        }
    }
}
