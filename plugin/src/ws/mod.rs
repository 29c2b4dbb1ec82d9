//! WebSocket Connection Table
//!
//! Handle-based WebSocket access for runtimes that poll instead of awaiting:
//! a table of connections, the `env.ws_*` host ABI over it, Boa script
//! bindings, and a single-connection client for game code.
//! No Bevy dependencies - this can be used standalone.

mod client;
mod config;
mod error;
mod memory;
mod state;
mod table;
mod transport;

pub mod abi;
pub mod script;

#[cfg(target_arch = "wasm32")]
mod guest;
#[cfg(not(target_arch = "wasm32"))]
mod tungstenite;

pub use client::{DefaultBackend, QuadWs, WsBackend};
pub use config::ConnectorConfig;
pub use error::{Result, WsError};
pub use memory::MemoryConnector;
pub use state::{Handle, WsState, WS_CLOSED, WS_CONNECTING, WS_NOT_EXISTING, WS_OPEN};
pub use table::ConnectionTable;
pub use transport::{Connector, EventSink, Transport, TransportEvent, parse_endpoint};

#[cfg(target_arch = "wasm32")]
pub use guest::HostImports;
#[cfg(not(target_arch = "wasm32"))]
pub use tungstenite::TungsteniteConnector;
