//! Error type shared by the connection table and its bindings.

use thiserror::Error;

use crate::ws::state::{Handle, WsState};

pub type Result<T> = std::result::Result<T, WsError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WsError {
    /// The endpoint is not a valid WebSocket URL.
    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    /// The connector refused to construct a transport.
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("No handles left")]
    HandlesExhausted,

    #[error("WebSocket {0} not found")]
    UnknownHandle(Handle),

    #[error("WebSocket {0} is closed")]
    Closed(Handle),

    #[error("WebSocket {handle} is not open ({state})")]
    NotOpen { handle: Handle, state: WsState },

    #[error("WebSocket {0} has no pending frame")]
    NoPendingFrame(Handle),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Memory range {ptr}+{len} is out of bounds")]
    MemoryOutOfBounds { ptr: u32, len: u32 },

    #[error("Endpoint is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for WsError {
    fn from(err: serde_json::Error) -> Self {
        WsError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_handle() {
        let err = WsError::NotOpen {
            handle: Handle::new(4),
            state: WsState::Connecting,
        };
        assert_eq!(err.to_string(), "WebSocket 4 is not open (connecting)");
    }

    #[test]
    fn json_errors_become_config_errors() {
        let err: WsError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, WsError::Config(_)));
    }
}
