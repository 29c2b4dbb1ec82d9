//! Host ABI.
//!
//! The `env.ws_*` imports a guest module links against. Pointers and
//! lengths address the guest's linear memory, handed in by the host as a
//! byte slice; every failure is folded into a sentinel return value so the
//! guest never sees a trap from this layer.

use crate::ws::error::{Result, WsError};
use crate::ws::state::{Handle, WS_NOT_EXISTING};
use crate::ws::table::ConnectionTable;

/// Returned by `ws_open` when no connection was created.
pub const INVALID_HANDLE: i32 = -1;
/// Returned by `ws_available` and `ws_read` when no frame is pending.
pub const NO_FRAME: i32 = -1;

/// Name and version under which the imports are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
}

pub const PLUGIN: PluginInfo = PluginInfo {
    name: "miniquad_websocket",
    version: "0.0.1",
};

/// Import namespace the functions live in.
pub const NAMESPACE: &str = "env";

/// Every import name, in registration order.
pub const IMPORTS: [&str; 7] = [
    "ws_open",
    "ws_revive",
    "ws_write",
    "ws_read",
    "ws_available",
    "ws_state",
    "ws_close",
];

/// Bytes of a `len`-byte guest buffer that `ws_read` filled, given its
/// return value. A zero count from a host whose `ws_read` returns nothing
/// means the whole buffer, which the guest sized from `ws_available`.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub(crate) fn copied_len(count: i32, len: usize) -> Option<usize> {
    match usize::try_from(count) {
        Err(_) => None,
        Ok(0) => Some(len),
        Ok(count) => Some(count.min(len)),
    }
}

/// Borrow `len` bytes at `ptr`.
pub fn guest_slice(memory: &[u8], ptr: u32, len: u32) -> Result<&[u8]> {
    let range = guest_range(memory.len(), ptr, len)?;
    Ok(&memory[range])
}

/// Mutably borrow `len` bytes at `ptr`.
pub fn guest_slice_mut(memory: &mut [u8], ptr: u32, len: u32) -> Result<&mut [u8]> {
    let range = guest_range(memory.len(), ptr, len)?;
    Ok(&mut memory[range])
}

fn guest_range(size: usize, ptr: u32, len: u32) -> Result<std::ops::Range<usize>> {
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|end| *end <= size)
        .ok_or(WsError::MemoryOutOfBounds { ptr, len })?;
    Ok(start..end)
}

/// The import functions, bound to one table.
pub struct EnvImports<'t> {
    table: &'t mut ConnectionTable,
}

impl<'t> EnvImports<'t> {
    pub fn new(table: &'t mut ConnectionTable) -> Self {
        Self { table }
    }

    /// `ws_open(ptr, len) -> i32`: handle, or `INVALID_HANDLE`.
    pub fn ws_open(&mut self, memory: &[u8], ptr: u32, len: u32) -> i32 {
        match self.open(memory, ptr, len) {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                log::error!("[WebSocket Native] ws_open failed: {}", e);
                INVALID_HANDLE
            }
        }
    }

    fn open(&mut self, memory: &[u8], ptr: u32, len: u32) -> Result<Handle> {
        let bytes = guest_slice(memory, ptr, len)?;
        let endpoint = std::str::from_utf8(bytes).map_err(|_| WsError::InvalidUtf8)?;
        self.table.open(endpoint)
    }

    /// `ws_revive(id) -> bool`
    pub fn ws_revive(&mut self, id: i32) -> bool {
        let Some(handle) = Handle::from_raw(id) else {
            return false;
        };
        match self.table.revive(handle) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("[WebSocket Native] ws_revive({}) failed: {}", id, e);
                false
            }
        }
    }

    /// `ws_write(id, ptr, len) -> bool`
    pub fn ws_write(&mut self, memory: &[u8], id: i32, ptr: u32, len: u32) -> bool {
        let Some(handle) = Handle::from_raw(id) else {
            return false;
        };
        let result = guest_slice(memory, ptr, len).and_then(|data| self.table.write(handle, data));
        match result {
            Ok(()) => true,
            Err(e) => {
                log::debug!("[WebSocket Native] ws_write({}) failed: {}", id, e);
                false
            }
        }
    }

    /// `ws_available(id) -> i32`: length of the next frame, or `NO_FRAME`.
    pub fn ws_available(&mut self, id: i32) -> i32 {
        Handle::from_raw(id)
            .and_then(|handle| self.table.available(handle))
            .and_then(|len| i32::try_from(len).ok())
            .unwrap_or(NO_FRAME)
    }

    /// `ws_read(id, ptr, max_len) -> i32`: pops the next frame into guest
    /// memory, returning the number of bytes copied, or `NO_FRAME`.
    ///
    /// An out-of-bounds destination leaves the frame queued.
    pub fn ws_read(&mut self, memory: &mut [u8], id: i32, ptr: u32, max_len: u32) -> i32 {
        let Some(handle) = Handle::from_raw(id) else {
            return NO_FRAME;
        };
        let result = guest_slice_mut(memory, ptr, max_len).and_then(|dest| self.table.read(handle, dest));
        match result {
            Ok(count) => count as i32,
            Err(e) => {
                log::debug!("[WebSocket Native] ws_read({}) failed: {}", id, e);
                NO_FRAME
            }
        }
    }

    /// `ws_state(id) -> i32`
    pub fn ws_state(&mut self, id: i32) -> i32 {
        match Handle::from_raw(id) {
            Some(handle) => self.table.state(handle).as_raw(),
            None => WS_NOT_EXISTING,
        }
    }

    /// `ws_close(id)`
    pub fn ws_close(&mut self, id: i32) {
        if let Some(handle) = Handle::from_raw(id) {
            self.table.close(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::memory::MemoryConnector;
    use crate::ws::state::{WS_CLOSED, WS_CONNECTING, WS_OPEN};

    /// Guest memory with the endpoint written at offset 16.
    fn memory_with(endpoint: &str) -> (Vec<u8>, u32, u32) {
        let mut memory = vec![0u8; 256];
        memory[16..16 + endpoint.len()].copy_from_slice(endpoint.as_bytes());
        (memory, 16, endpoint.len() as u32)
    }

    #[test]
    fn full_session_through_linear_memory() {
        let net = MemoryConnector::new();
        let mut table = ConnectionTable::new(net.clone());
        let mut env = EnvImports::new(&mut table);

        let (mut memory, ptr, len) = memory_with("wss://example/socket");
        let id = env.ws_open(&memory, ptr, len);
        assert_eq!(id, 0);
        assert_eq!(env.ws_state(id), WS_CONNECTING);

        memory[100..110].copy_from_slice(&[1; 10]);
        assert!(!env.ws_write(&memory, id, 100, 10));
        assert!(net.sent(0).is_empty());

        net.accept(0);
        assert_eq!(env.ws_state(id), WS_OPEN);
        assert!(env.ws_write(&memory, id, 100, 10));
        assert_eq!(net.sent(0), vec![vec![1; 10]]);

        net.deliver(0, vec![5, 4, 3, 2, 1]);
        assert_eq!(env.ws_available(id), 5);
        assert_eq!(env.ws_read(&mut memory, id, 200, 8), 5);
        assert_eq!(&memory[200..208], &[5, 4, 3, 2, 1, 0, 0, 0]);
        assert_eq!(env.ws_available(id), NO_FRAME);

        env.ws_close(id);
        env.ws_close(id);
        assert_eq!(env.ws_state(id), WS_CLOSED);
        assert!(!env.ws_revive(id));
    }

    #[test]
    fn bad_endpoints_return_the_invalid_handle() {
        let mut table = ConnectionTable::new(MemoryConnector::new());
        let mut env = EnvImports::new(&mut table);

        let (memory, ptr, len) = memory_with("definitely not a url");
        assert_eq!(env.ws_open(&memory, ptr, len), INVALID_HANDLE);
        assert_eq!(env.ws_state(INVALID_HANDLE), WS_NOT_EXISTING);

        let invalid_utf8 = [0xffu8, 0xfe, 0xfd];
        assert_eq!(env.ws_open(&invalid_utf8, 0, 3), INVALID_HANDLE);
    }

    #[test]
    fn out_of_bounds_ranges_are_sentinels() {
        let net = MemoryConnector::new();
        let mut table = ConnectionTable::new(net.clone());
        let mut env = EnvImports::new(&mut table);

        let (mut memory, ptr, len) = memory_with("ws://example/socket");
        assert_eq!(env.ws_open(&memory, 250, 64), INVALID_HANDLE);
        let id = env.ws_open(&memory, ptr, len);
        net.accept(0);

        assert!(!env.ws_write(&memory, id, u32::MAX, 2));
        net.deliver(0, vec![1, 2]);
        assert_eq!(env.ws_read(&mut memory, id, 255, 4), NO_FRAME);
        assert_eq!(env.ws_available(id), 2);
    }

    #[test]
    fn unknown_ids_behave_like_missing_connections() {
        let mut table = ConnectionTable::new(MemoryConnector::new());
        let mut env = EnvImports::new(&mut table);
        let mut memory = vec![0u8; 8];

        for id in [-7, 0, 42] {
            assert_eq!(env.ws_state(id), WS_NOT_EXISTING);
            assert_eq!(env.ws_available(id), NO_FRAME);
            assert!(!env.ws_write(&memory, id, 0, 4));
            assert_eq!(env.ws_read(&mut memory, id, 0, 4), NO_FRAME);
            assert!(!env.ws_revive(id));
            env.ws_close(id);
        }
    }

    #[test]
    fn read_counts_decode_for_the_guest() {
        assert_eq!(copied_len(5, 5), Some(5));
        assert_eq!(copied_len(3, 5), Some(3));
        assert_eq!(copied_len(9, 5), Some(5));
        assert_eq!(copied_len(NO_FRAME, 5), None);
        // Host whose ws_read returns nothing.
        assert_eq!(copied_len(0, 5), Some(5));
        assert_eq!(copied_len(0, 0), Some(0));
    }

    #[test]
    fn import_list_covers_every_function() {
        assert_eq!(IMPORTS.len(), 7);
        assert_eq!(PLUGIN.name, "miniquad_websocket");
        assert_eq!(NAMESPACE, "env");
    }
}
