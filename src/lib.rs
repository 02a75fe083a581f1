//! Real-time multiplayer quiz rooms over WebSocket.
//!
//! Exposes the room engine for the server binary and integration tests.

pub mod config;
pub mod error;
pub mod game;
pub mod player;
pub mod registry;
pub mod room;
pub mod scoring;
pub mod server;
pub mod store;
pub mod types;
pub mod ws;
