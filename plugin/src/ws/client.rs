//! Single-connection client.
//!
//! `QuadWs` is what game code holds: one connection, polled once per frame.
//! It runs over any [`WsBackend`]; natively that is an owned
//! [`ConnectionTable`], inside a `wasm32` guest it is the host's imports.

use crate::ws::error::Result;
use crate::ws::state::{Handle, WsState};
use crate::ws::table::ConnectionTable;

/// The operations `QuadWs` needs from whatever holds the connection.
pub trait WsBackend {
    fn open(&mut self, endpoint: &str) -> Result<Handle>;
    fn revive(&mut self, handle: Handle) -> bool;
    fn write(&mut self, handle: Handle, data: &[u8]) -> bool;
    /// Pop the next inbound frame, if any.
    fn read(&mut self, handle: Handle) -> Option<Vec<u8>>;
    fn state(&mut self, handle: Handle) -> WsState;
    fn close(&mut self, handle: Handle);
}

impl WsBackend for ConnectionTable {
    fn open(&mut self, endpoint: &str) -> Result<Handle> {
        ConnectionTable::open(self, endpoint)
    }

    fn revive(&mut self, handle: Handle) -> bool {
        ConnectionTable::revive(self, handle).is_ok()
    }

    fn write(&mut self, handle: Handle, data: &[u8]) -> bool {
        ConnectionTable::write(self, handle, data).is_ok()
    }

    fn read(&mut self, handle: Handle) -> Option<Vec<u8>> {
        self.read_frame(handle).ok()
    }

    fn state(&mut self, handle: Handle) -> WsState {
        ConnectionTable::state(self, handle)
    }

    fn close(&mut self, handle: Handle) {
        ConnectionTable::close(self, handle)
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub type DefaultBackend = ConnectionTable;
#[cfg(target_arch = "wasm32")]
pub type DefaultBackend = crate::ws::guest::HostImports;

pub struct QuadWs<B: WsBackend = DefaultBackend> {
    backend: B,
    handle: Handle,
}

#[cfg(not(target_arch = "wasm32"))]
impl QuadWs<ConnectionTable> {
    /// Connect over a private table with the native connector.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let table = ConnectionTable::new(crate::ws::tungstenite::TungsteniteConnector::default());
        Self::with_backend(table, url)
    }
}

#[cfg(target_arch = "wasm32")]
impl QuadWs<crate::ws::guest::HostImports> {
    /// Connect through the host's `env.ws_*` imports.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_backend(crate::ws::guest::HostImports, url)
    }
}

impl<B: WsBackend> QuadWs<B> {
    pub fn with_backend(mut backend: B, url: impl Into<String>) -> Result<Self> {
        let handle = backend.open(&url.into())?;
        Ok(Self { backend, handle })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Send a binary frame. Fails unless connected.
    pub fn write(&mut self, data: &[u8]) -> bool {
        self.backend.write(self.handle, data)
    }

    /// Next inbound frame, oldest first.
    pub fn read(&mut self) -> Option<Vec<u8>> {
        self.backend.read(self.handle)
    }

    pub fn connected(&mut self) -> bool {
        self.state().is_open()
    }

    /// Reconnect to the original url if the connection dropped.
    pub fn revive(&mut self) -> bool {
        self.backend.revive(self.handle)
    }

    pub fn state(&mut self) -> WsState {
        self.backend.state(self.handle)
    }

    pub fn close(&mut self) {
        self.backend.close(self.handle)
    }
}
