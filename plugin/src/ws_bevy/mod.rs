//! WebSocket Bevy Plugin
//!
//! Owns the connection table for a Bevy app and keeps it pumped every frame.

mod plugin;

pub use plugin::{ConnectionStates, QuadWsPlugin};

// Re-export core types for convenience
pub use crate::ws::{ConnectionTable, Connector, Handle, WsState};
