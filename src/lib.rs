//! Dogfight Server - authoritative relay for a multiplayer aircraft game
//!
//! Accepts WebSocket connections, keeps the shared world state (positions,
//! health, kills, aliveness), relays state changes between players and
//! enforces the combat and respawn rules.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
