//! Shared protocol library for the Bomberbots server and client
//!
//! Holds everything both endpoints must agree on: the game vocabulary
//! (positions, players, bombs, events), the four message unions, and the
//! binary wire codec that keeps their byte layout identical everywhere.

pub mod codec;
pub mod messages;
pub mod types;

pub use codec::{Decode, DecodeError, Encode};
pub use messages::{
    AcceptedPlayer, ClientMessageGui, ClientMessageServer, Game, GameEnded, GameStarted,
    GuiMessageClient, Hello, Lobby, ServerMessageClient, MAX_UDP_DATAGRAM,
};
pub use types::{Bomb, BombId, Direction, Event, Player, PlayerId, Position, Score, SignedPosition, Turn};
