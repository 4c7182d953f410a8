//! # Bomberbots Client Library
//!
//! The client is a relay between a human-facing GUI process and the game
//! server: GUI intents arrive as UDP datagrams and are translated onto the
//! server's TCP stream, server updates are folded into local mirrors and
//! forwarded to the GUI as complete lobby/game snapshots.
//!
//! ## Module Organization
//!
//! - [`relay`]: the session state machine (phase tracking, snapshot
//!   mirrors, and the message translation rules). Pure logic, no sockets.
//! - [`network`]: socket setup, the two reader tasks, and the event loop
//!   that owns the session.
//!
//! The split keeps everything phase-dependent (which messages are legal
//! when, what to forward where) testable without any networking.

pub mod network;
pub mod relay;
