//! Guest side of the host ABI, for modules compiled to `wasm32`.
//!
//! `ws_read` is expected to return the number of bytes copied, or `-1`.
//! Hosts whose `ws_read` returns nothing read back as `0`; the buffer was
//! sized from `ws_available`, so a zero count then means the whole frame.

use crate::ws::abi::copied_len;
use crate::ws::client::WsBackend;
use crate::ws::error::{Result, WsError};
use crate::ws::state::{Handle, WsState};

unsafe extern "C" {
    fn ws_open(ptr: *const u8, len: u32) -> i32;
    fn ws_revive(id: i32) -> bool;
    fn ws_write(id: i32, ptr: *const u8, len: u32) -> bool;
    fn ws_read(id: i32, ptr: *mut u8, len: u32) -> i32;
    fn ws_available(id: i32) -> i32;
    fn ws_state(id: i32) -> i32;
    fn ws_close(id: i32);
}

/// The `env.ws_*` imports provided by the embedding host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostImports;

impl WsBackend for HostImports {
    fn open(&mut self, endpoint: &str) -> Result<Handle> {
        let id = unsafe { ws_open(endpoint.as_ptr(), endpoint.len() as u32) };
        Handle::from_raw(id).ok_or_else(|| WsError::Connect(format!("host refused {}", endpoint)))
    }

    fn revive(&mut self, handle: Handle) -> bool {
        unsafe { ws_revive(handle.as_raw()) }
    }

    fn write(&mut self, handle: Handle, data: &[u8]) -> bool {
        unsafe { ws_write(handle.as_raw(), data.as_ptr(), data.len() as u32) }
    }

    fn read(&mut self, handle: Handle) -> Option<Vec<u8>> {
        let available = unsafe { ws_available(handle.as_raw()) };
        let len = usize::try_from(available).ok()?;
        let mut buffer = vec![0u8; len];
        let count = unsafe { ws_read(handle.as_raw(), buffer.as_mut_ptr(), len as u32) };
        buffer.truncate(copied_len(count, len)?);
        Some(buffer)
    }

    fn state(&mut self, handle: Handle) -> WsState {
        WsState::from_raw(unsafe { ws_state(handle.as_raw()) })
    }

    fn close(&mut self, handle: Handle) {
        unsafe { ws_close(handle.as_raw()) }
    }
}

