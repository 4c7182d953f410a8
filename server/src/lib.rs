//! # Bomberbots Server Library
//!
//! Authoritative server for the Bomberbots multiplayer game. The server owns
//! the canonical game state and advances it in discrete turns: bombs tick
//! down and explode, player intents (move, place bomb, place block) are
//! validated against the board, and every state change is broadcast to all
//! connected clients as an immutable event record.
//!
//! ## Module Organization
//!
//! - [`engine`]: the turn simulation (game state, settings, the seeded
//!   random stream, and the per-turn resolution rules). Purely synchronous;
//!   it never touches a socket.
//! - [`connections`]: registry of live TCP connections and their writer
//!   channels, owned by the main loop.
//! - [`network`]: the TCP listener, per-connection reader/writer tasks,
//!   and the `tokio::select!` loop that drives the engine from connection
//!   events and the turn timer.
//!
//! ## Architecture
//!
//! All mutation happens on one task: reader tasks decode messages and hand
//! them over a channel to the main loop, which is the engine's single
//! writer. Clients receive the full event history on connect, so a late
//! joiner can reconstruct the current board.

pub mod connections;
pub mod engine;
pub mod network;
