//! # WebSocket bridge for game-engine runtimes
//!
//! Exposes WebSocket connections to code that runs in a single-threaded,
//! frame-polled loop: a guest `wasm32` module importing `env.ws_*`, a Boa
//! script, or a Bevy system. Connections live in a [`ConnectionTable`]
//! addressed by small integer handles; inbound frames queue up until the
//! caller drains them, and nothing blocks.
//!
//! ## Example
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_quad_ws::{ConnectionTable, QuadWsPlugin};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(MinimalPlugins)
//!         .add_plugins(QuadWsPlugin::new())
//!         .add_systems(Startup, connect)
//!         .run();
//! }
//!
//! fn connect(mut table: NonSendMut<ConnectionTable>) {
//!     if let Err(e) = table.open("ws://127.0.0.1:7878") {
//!         error!("connect failed: {}", e);
//!     }
//! }
//! ```
pub mod ws;
pub mod ws_bevy;

pub use ws::*;
pub use ws_bevy::{ConnectionStates, QuadWsPlugin};
