//! Connection handles and states, with their raw ABI numbering.

use std::fmt;

/// Raw state value for a handle the table does not know.
pub const WS_NOT_EXISTING: i32 = -1;
/// Raw state value shared by `Connecting` and `Disconnected`.
pub const WS_CONNECTING: i32 = 0;
pub const WS_OPEN: i32 = 1;
pub const WS_CLOSED: i32 = 2;

/// Opaque connection handle, assigned sequentially from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Largest handle representable as a non-negative `i32`.
    pub const MAX: Handle = Handle(i32::MAX as u32);

    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// Interpret a raw ABI id. Negative ids never name a connection.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Handle)
    }

    pub fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection as seen by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WsState {
    /// The handle was never assigned.
    NotExisting,
    /// Transport constructed, handshake not finished yet.
    Connecting,
    Open,
    /// The transport failed or the peer hung up. Revivable.
    Disconnected,
    /// Closed by the caller. Terminal.
    Closed,
}

impl WsState {
    pub fn as_raw(self) -> i32 {
        match self {
            WsState::NotExisting => WS_NOT_EXISTING,
            WsState::Connecting | WsState::Disconnected => WS_CONNECTING,
            WsState::Open => WS_OPEN,
            WsState::Closed => WS_CLOSED,
        }
    }

    /// Decode a raw state. `0` decodes as `Connecting`; out-of-range values
    /// are treated as `Closed`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            WS_NOT_EXISTING => WsState::NotExisting,
            WS_CONNECTING => WsState::Connecting,
            WS_OPEN => WsState::Open,
            _ => WsState::Closed,
        }
    }

    pub fn is_open(self) -> bool {
        self == WsState::Open
    }
}

impl fmt::Display for WsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WsState::NotExisting => "not-existing",
            WsState::Connecting => "connecting",
            WsState::Open => "open",
            WsState::Disconnected => "disconnected",
            WsState::Closed => "closed",
        };
        f.write_str(name)
    }
}
