//! In-process connector.
//!
//! `MemoryConnector` builds transports that never touch the network. The
//! connector is cheap to clone; every clone sees the same peers, so a test or
//! a headless host keeps one clone and drives the "remote" side by hand.
//! Peers are indexed in construction order, so a revived connection gets a
//! new peer index while keeping its table handle.

use std::sync::{Arc, Mutex};

use crate::ws::error::{Result, WsError};
use crate::ws::transport::{Connector, EventSink, Transport, parse_endpoint};
use crate::ws::state::Handle;

struct Peer {
    endpoint: String,
    sink: EventSink,
    sent: Vec<Vec<u8>>,
    closed: bool,
}

#[derive(Default)]
struct Network {
    peers: Vec<Peer>,
    refuse: bool,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    network: Arc<Mutex<Network>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `connect` fail as if the transport threw.
    pub fn refuse_connections(&self, refuse: bool) {
        if let Ok(mut network) = self.network.lock() {
            network.refuse = refuse;
        }
    }

    /// Number of transports constructed so far.
    pub fn peer_count(&self) -> usize {
        self.network.lock().map(|n| n.peers.len()).unwrap_or(0)
    }

    pub fn endpoint(&self, peer: usize) -> Option<String> {
        self.with_peer(peer, |p| p.endpoint.clone())
    }

    pub fn handle(&self, peer: usize) -> Option<Handle> {
        self.with_peer(peer, |p| p.sink.handle())
    }

    /// Frames the table wrote to this peer, oldest first.
    pub fn sent(&self, peer: usize) -> Vec<Vec<u8>> {
        self.with_peer(peer, |p| p.sent.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self, peer: usize) -> bool {
        self.with_peer(peer, |p| p.closed).unwrap_or(false)
    }

    /// Finish the handshake.
    pub fn accept(&self, peer: usize) -> bool {
        self.with_peer(peer, |p| p.sink.opened()).unwrap_or(false)
    }

    /// Deliver one inbound frame.
    pub fn deliver(&self, peer: usize, data: impl Into<Vec<u8>>) -> bool {
        let data = data.into();
        self.with_peer(peer, |p| p.sink.message(data)).unwrap_or(false)
    }

    /// Report a transport error followed by an abnormal close, the way a
    /// browser does when a socket drops.
    pub fn fail(&self, peer: usize, message: &str) -> bool {
        self.with_peer(peer, |p| {
            p.closed = true;
            p.sink.error(message) && p.sink.closed(1006, message)
        })
        .unwrap_or(false)
    }

    /// The remote side closes the connection cleanly.
    pub fn hang_up(&self, peer: usize, code: u16, reason: &str) -> bool {
        self.with_peer(peer, |p| {
            p.closed = true;
            p.sink.closed(code, reason)
        })
        .unwrap_or(false)
    }

    fn with_peer<T>(&self, peer: usize, f: impl FnOnce(&mut Peer) -> T) -> Option<T> {
        let mut network = self.network.lock().ok()?;
        network.peers.get_mut(peer).map(f)
    }
}

impl Connector for MemoryConnector {
    fn connect(&mut self, endpoint: &str, events: EventSink) -> Result<Box<dyn Transport>> {
        parse_endpoint(endpoint)?;

        let mut network = self
            .network
            .lock()
            .map_err(|_| WsError::Connect("memory network poisoned".to_string()))?;
        if network.refuse {
            return Err(WsError::Connect(format!("refused {}", endpoint)));
        }

        let index = network.peers.len();
        network.peers.push(Peer {
            endpoint: endpoint.to_string(),
            sink: events,
            sent: Vec::new(),
            closed: false,
        });

        Ok(Box::new(MemoryTransport {
            network: self.network.clone(),
            index,
        }))
    }
}

struct MemoryTransport {
    network: Arc<Mutex<Network>>,
    index: usize,
}

impl Transport for MemoryTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut network = self
            .network
            .lock()
            .map_err(|_| WsError::Transport("memory network poisoned".to_string()))?;
        match network.peers.get_mut(self.index) {
            Some(peer) if !peer.closed => {
                peer.sent.push(data.to_vec());
                Ok(())
            }
            _ => Err(WsError::Transport("peer is gone".to_string())),
        }
    }

    fn close(&mut self) {
        if let Ok(mut network) = self.network.lock() {
            if let Some(peer) = network.peers.get_mut(self.index) {
                peer.closed = true;
            }
        }
    }
}
