//! Connection table.
//!
//! Maps handles to connection records and marshals frames between callers
//! and per-connection queues. Every public operation first drains the event
//! queue, so transport events are never applied concurrently with a caller.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::ws::error::{Result, WsError};
use crate::ws::state::{Handle, WsState};
use crate::ws::transport::{Connector, Envelope, EventSink, Transport, TransportEvent};

struct LiveConnection {
    endpoint: String,
    state: WsState,
    inbound: VecDeque<Vec<u8>>,
    transport: Option<Box<dyn Transport>>,
    epoch: u64,
}

impl LiveConnection {
    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

enum Connection {
    Live(LiveConnection),
    /// Terminal record left behind by `close`.
    Closed,
}

/// Handle table for every connection opened through one connector.
pub struct ConnectionTable {
    connector: Box<dyn Connector>,
    connections: HashMap<Handle, Connection>,
    next_handle: u32,
    next_epoch: u64,
    events_tx: Sender<Envelope>,
    events_rx: Receiver<Envelope>,
}

impl ConnectionTable {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::from_boxed(Box::new(connector))
    }

    pub fn from_boxed(connector: Box<dyn Connector>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            connector,
            connections: HashMap::new(),
            next_handle: 0,
            next_epoch: 0,
            events_tx,
            events_rx,
        }
    }

    /// Open a connection to `endpoint`. The handle is registered right away
    /// in `Connecting`; no handle is consumed if construction fails.
    pub fn open(&mut self, endpoint: impl Into<String>) -> Result<Handle> {
        self.pump_events();

        let endpoint = endpoint.into();
        let handle = Handle::new(self.next_handle);
        if handle > Handle::MAX {
            return Err(WsError::HandlesExhausted);
        }

        let epoch = self.bump_epoch();
        let sink = EventSink::new(handle, epoch, self.events_tx.clone());
        let transport = match self.connector.connect(&endpoint, sink) {
            Ok(transport) => transport,
            Err(e) => {
                log::warn!("[WebSocket] open({}) failed: {}", endpoint, e);
                return Err(e);
            }
        };

        self.next_handle += 1;
        log::info!("[WebSocket {}] Connecting to {}", handle, endpoint);
        self.connections.insert(
            handle,
            Connection::Live(LiveConnection {
                endpoint,
                state: WsState::Connecting,
                inbound: VecDeque::new(),
                transport: Some(transport),
                epoch,
            }),
        );

        Ok(handle)
    }

    /// Reconnect a dropped connection to its stored endpoint, keeping the
    /// handle. Succeeds trivially when the connection is already open.
    pub fn revive(&mut self, handle: Handle) -> Result<()> {
        self.pump_events();

        let epoch = self.bump_epoch();
        let conn = match self.connections.get_mut(&handle) {
            None => return Err(WsError::UnknownHandle(handle)),
            Some(Connection::Closed) => return Err(WsError::Closed(handle)),
            Some(Connection::Live(conn)) => conn,
        };

        if conn.state == WsState::Open {
            return Ok(());
        }

        conn.release_transport();
        conn.epoch = epoch;

        let sink = EventSink::new(handle, epoch, self.events_tx.clone());
        match self.connector.connect(&conn.endpoint, sink) {
            Ok(transport) => {
                log::info!("[WebSocket {}] Reviving {}", handle, conn.endpoint);
                conn.transport = Some(transport);
                conn.state = WsState::Connecting;
                Ok(())
            }
            Err(e) => {
                log::warn!("[WebSocket {}] Revive failed: {}", handle, e);
                conn.state = WsState::Disconnected;
                Err(e)
            }
        }
    }

    /// Send one binary frame. Nothing is queued: writes while the connection
    /// is not open fail.
    pub fn write(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        self.pump_events();

        let conn = self.live_mut(handle)?;
        if conn.state != WsState::Open {
            return Err(WsError::NotOpen {
                handle,
                state: conn.state,
            });
        }

        let transport = conn.transport.as_mut().ok_or(WsError::NotOpen {
            handle,
            state: conn.state,
        })?;
        log::debug!("[WebSocket {}] send({} bytes)", handle, data.len());
        transport.send(data)
    }

    /// Length of the oldest pending frame, without consuming it.
    pub fn available(&mut self, handle: Handle) -> Option<usize> {
        self.pump_events();

        match self.connections.get(&handle) {
            Some(Connection::Live(conn)) => conn.inbound.front().map(Vec::len),
            _ => None,
        }
    }

    /// Pop the oldest pending frame into `buf`, returning the number of bytes
    /// copied. Bytes past `buf.len()` are dropped.
    pub fn read(&mut self, handle: Handle, buf: &mut [u8]) -> Result<usize> {
        let frame = self.read_frame(handle)?;
        let count = frame.len().min(buf.len());
        buf[..count].copy_from_slice(&frame[..count]);
        if count < frame.len() {
            log::debug!(
                "[WebSocket {}] Truncated frame of {} bytes to {}",
                handle,
                frame.len(),
                count
            );
        }
        Ok(count)
    }

    /// Pop the oldest pending frame whole.
    pub fn read_frame(&mut self, handle: Handle) -> Result<Vec<u8>> {
        self.pump_events();

        match self.connections.get_mut(&handle) {
            None => Err(WsError::UnknownHandle(handle)),
            Some(Connection::Closed) => Err(WsError::NoPendingFrame(handle)),
            Some(Connection::Live(conn)) => conn
                .inbound
                .pop_front()
                .ok_or(WsError::NoPendingFrame(handle)),
        }
    }

    pub fn state(&mut self, handle: Handle) -> WsState {
        self.pump_events();
        self.last_known_state(handle)
    }

    /// State as of the last pump, for callers holding a shared borrow.
    pub fn last_known_state(&self, handle: Handle) -> WsState {
        match self.connections.get(&handle) {
            None => WsState::NotExisting,
            Some(Connection::Closed) => WsState::Closed,
            Some(Connection::Live(conn)) => conn.state,
        }
    }

    /// Close the connection and collapse its record to a terminal marker.
    /// Closing twice, or closing an unknown handle, does nothing.
    pub fn close(&mut self, handle: Handle) {
        self.pump_events();

        if let Some(entry) = self.connections.get_mut(&handle) {
            if let Connection::Live(conn) = entry {
                log::info!("[WebSocket {}] Closing", handle);
                conn.release_transport();
                *entry = Connection::Closed;
            }
        }
    }

    /// Apply every queued transport event. Returns how many were applied.
    pub fn pump_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            if self.apply(envelope) {
                applied += 1;
            }
        }
        applied
    }

    /// Frames waiting to be read on `handle`.
    pub fn pending_frames(&self, handle: Handle) -> usize {
        match self.connections.get(&handle) {
            Some(Connection::Live(conn)) => conn.inbound.len(),
            _ => 0,
        }
    }

    /// Every handle still in the table, closed ones included, in order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.connections.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn endpoint(&self, handle: Handle) -> Option<&str> {
        match self.connections.get(&handle) {
            Some(Connection::Live(conn)) => Some(conn.endpoint.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn bump_epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    fn live_mut(&mut self, handle: Handle) -> Result<&mut LiveConnection> {
        match self.connections.get_mut(&handle) {
            None => Err(WsError::UnknownHandle(handle)),
            Some(Connection::Closed) => Err(WsError::Closed(handle)),
            Some(Connection::Live(conn)) => Ok(conn),
        }
    }

    fn apply(&mut self, envelope: Envelope) -> bool {
        let Envelope {
            handle,
            epoch,
            event,
        } = envelope;

        let conn = match self.connections.get_mut(&handle) {
            Some(Connection::Live(conn)) if conn.epoch == epoch => conn,
            _ => {
                log::debug!("[WebSocket {}] Dropping stale {:?} event", handle, event);
                return false;
            }
        };

        match event {
            TransportEvent::Opened => {
                if conn.state == WsState::Connecting {
                    log::info!("[WebSocket {}] Open", handle);
                    conn.state = WsState::Open;
                }
            }
            TransportEvent::Message(data) => {
                log::debug!("[WebSocket {}] Received {} bytes", handle, data.len());
                conn.inbound.push_back(data);
            }
            TransportEvent::Error(message) => {
                log::warn!("[WebSocket {}] Error: {}", handle, message);
                conn.state = WsState::Disconnected;
                conn.release_transport();
            }
            TransportEvent::Closed { code, reason } => {
                log::info!("[WebSocket {}] Closed by transport: {} {}", handle, code, reason);
                conn.state = WsState::Disconnected;
                conn.release_transport();
            }
        }
        true
    }
}

impl Drop for ConnectionTable {
    fn drop(&mut self) {
        for conn in self.connections.values_mut() {
            if let Connection::Live(conn) = conn {
                conn.release_transport();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::memory::MemoryConnector;

    fn table() -> (ConnectionTable, MemoryConnector) {
        let net = MemoryConnector::new();
        (ConnectionTable::new(net.clone()), net)
    }

    #[test]
    fn unassigned_handles_do_not_exist() {
        let (mut table, _net) = table();
        let h = Handle::new(9);
        assert_eq!(table.state(h), WsState::NotExisting);
        assert_eq!(table.available(h), None);
        assert_eq!(table.write(h, b"hello"), Err(WsError::UnknownHandle(h)));
        assert_eq!(table.read_frame(h), Err(WsError::UnknownHandle(h)));
    }

    #[test]
    fn open_read_scenario() {
        let (mut table, net) = table();
        let h = table.open("wss://example/socket").unwrap();
        assert_eq!(h, Handle::new(0));
        assert_eq!(table.state(h), WsState::Connecting);

        net.accept(0);
        assert_eq!(table.state(h), WsState::Open);

        net.deliver(0, vec![1, 2, 3, 4, 5]);
        assert_eq!(table.available(h), Some(5));

        let mut buf = [0u8; 8];
        assert_eq!(table.read(h, &mut buf), Ok(5));
        assert_eq!(buf, [1, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(table.available(h), None);
    }

    #[test]
    fn failed_construction_returns_error_and_keeps_no_record() {
        let (mut table, _net) = table();
        assert!(matches!(table.open("nope"), Err(WsError::InvalidEndpoint { .. })));
        assert!(table.is_empty());

        let h = table.open("ws://example/ok").unwrap();
        assert_eq!(h, Handle::new(0));
    }

    #[test]
    fn handles_are_sequential() {
        let (mut table, _net) = table();
        let a = table.open("ws://example/a").unwrap();
        let b = table.open("ws://example/b").unwrap();
        table.close(a);
        let c = table.open("ws://example/c").unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        assert_eq!(table.handles(), vec![a, b, c]);
    }

    #[test]
    fn handles_stop_at_the_largest_raw_id() {
        let (mut t, net) = table();
        t.next_handle = Handle::MAX.index();

        let last = t.open("ws://example/a").unwrap();
        assert_eq!(last, Handle::MAX);
        assert_eq!(last.as_raw(), i32::MAX);

        assert!(matches!(t.open("ws://example/b"), Err(WsError::HandlesExhausted)));
        assert!(matches!(t.open("ws://example/c"), Err(WsError::HandlesExhausted)));
        assert_eq!(t.handles(), vec![Handle::MAX]);
        assert_eq!(net.peer_count(), 1);
    }

    #[test]
    fn write_while_connecting_is_rejected() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        assert_eq!(
            table.write(h, &[0; 10]),
            Err(WsError::NotOpen {
                handle: h,
                state: WsState::Connecting
            })
        );
        assert!(net.sent(0).is_empty());

        net.accept(0);
        table.write(h, b"ping").unwrap();
        assert_eq!(net.sent(0), vec![b"ping".to_vec()]);
    }

    #[test]
    fn frames_drain_first_in_first_out() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        net.accept(0);
        net.deliver(0, vec![1]);
        net.deliver(0, vec![2, 2]);
        net.deliver(0, vec![3, 3, 3]);

        let mut drained = Vec::new();
        while let Some(len) = table.available(h) {
            let mut buf = vec![0u8; len];
            assert_eq!(table.read(h, &mut buf), Ok(len));
            drained.push(buf);
        }
        assert_eq!(drained, vec![vec![1], vec![2, 2], vec![3, 3, 3]]);
        assert_eq!(table.available(h), None);
    }

    #[test]
    fn read_truncates_and_drops_the_rest() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        net.accept(0);
        net.deliver(0, b"abcdefgh".to_vec());
        net.deliver(0, b"xy".to_vec());

        let mut buf = [0u8; 3];
        assert_eq!(table.read(h, &mut buf), Ok(3));
        assert_eq!(&buf, b"abc");
        assert_eq!(table.available(h), Some(2));
    }

    #[test]
    fn read_with_nothing_pending_is_an_error() {
        let (mut table, _net) = table();
        let h = table.open("ws://example/socket").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(table.read(h, &mut buf), Err(WsError::NoPendingFrame(h)));
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        net.accept(0);
        net.deliver(0, vec![7]);

        table.close(h);
        assert_eq!(table.state(h), WsState::Closed);
        assert!(net.is_closed(0));
        assert_eq!(table.available(h), None);
        assert_eq!(table.endpoint(h), None);

        table.close(h);
        assert_eq!(table.state(h), WsState::Closed);
        assert_eq!(table.write(h, b"x"), Err(WsError::Closed(h)));
    }

    #[test]
    fn close_on_unknown_handle_is_a_no_op() {
        let (mut table, _net) = table();
        table.close(Handle::new(3));
        assert_eq!(table.state(Handle::new(3)), WsState::NotExisting);
    }

    #[test]
    fn revive_after_close_fails_without_reconnecting() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        table.close(h);

        assert_eq!(table.revive(h), Err(WsError::Closed(h)));
        assert_eq!(net.peer_count(), 1);
        assert_eq!(table.state(h), WsState::Closed);
        assert_eq!(table.revive(Handle::new(8)), Err(WsError::UnknownHandle(Handle::new(8))));
    }

    #[test]
    fn revive_when_open_is_trivial() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        net.accept(0);
        assert_eq!(table.revive(h), Ok(()));
        assert_eq!(net.peer_count(), 1);
    }

    #[test]
    fn transport_failure_disconnects_and_revive_reconnects() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        net.accept(0);
        net.deliver(0, vec![4, 2]);
        net.fail(0, "connection reset");

        assert_eq!(table.state(h), WsState::Disconnected);
        assert_eq!(table.state(h).as_raw(), 0);
        assert_eq!(table.available(h), Some(2));

        table.revive(h).unwrap();
        assert_eq!(net.peer_count(), 2);
        assert_eq!(net.endpoint(1).as_deref(), Some("ws://example/socket"));
        assert_eq!(net.handle(1), Some(h));
        assert_eq!(table.state(h), WsState::Connecting);

        net.accept(1);
        assert_eq!(table.state(h), WsState::Open);
        table.write(h, b"again").unwrap();
        assert_eq!(net.sent(1), vec![b"again".to_vec()]);
    }

    #[test]
    fn events_from_a_replaced_transport_are_ignored() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        table.revive(h).unwrap();
        assert!(net.is_closed(0));

        net.accept(0);
        net.deliver(0, vec![9, 9]);
        net.hang_up(0, 1000, "late");
        assert_eq!(table.pump_events(), 0);
        assert_eq!(table.state(h), WsState::Connecting);
        assert_eq!(table.available(h), None);
    }

    #[test]
    fn revive_that_cannot_construct_reports_failure() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        net.hang_up(0, 1001, "going away");
        assert_eq!(table.state(h), WsState::Disconnected);

        net.refuse_connections(true);
        assert!(matches!(table.revive(h), Err(WsError::Connect(_))));
        assert_eq!(table.state(h), WsState::Disconnected);
    }

    #[test]
    fn last_known_state_does_not_pump() {
        let (mut table, net) = table();
        let h = table.open("ws://example/socket").unwrap();
        net.accept(0);
        assert_eq!(table.last_known_state(h), WsState::Connecting);
        assert_eq!(table.pump_events(), 1);
        assert_eq!(table.last_known_state(h), WsState::Open);
    }

    #[test]
    fn dropping_the_table_closes_transports() {
        let (mut table, net) = table();
        table.open("ws://example/socket").unwrap();
        drop(table);
        assert!(net.is_closed(0));
        assert!(!net.accept(0));
    }
}
