//! Transport seam.
//!
//! The table never talks to a socket directly. A [`Connector`] builds a
//! [`Transport`] for an endpoint and hands the transport an [`EventSink`];
//! the transport reports open/message/error/close through the sink from
//! whatever thread it runs on, and the table applies those events the next
//! time it is touched.

use std::sync::mpsc::Sender;

use crate::ws::error::{Result, WsError};
use crate::ws::state::Handle;

/// Events a transport reports about its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(Vec<u8>),
    Error(String),
    Closed { code: u16, reason: String },
}

/// An event tagged with the connection generation that produced it.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub handle: Handle,
    pub epoch: u64,
    pub event: TransportEvent,
}

/// Delivers events for one transport generation back to the table.
#[derive(Debug, Clone)]
pub struct EventSink {
    handle: Handle,
    epoch: u64,
    tx: Sender<Envelope>,
}

impl EventSink {
    pub(crate) fn new(handle: Handle, epoch: u64, tx: Sender<Envelope>) -> Self {
        Self { handle, epoch, tx }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Queue an event. Returns false once the table has been dropped.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Envelope {
                handle: self.handle,
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    pub fn message(&self, data: impl Into<Vec<u8>>) -> bool {
        self.emit(TransportEvent::Message(data.into()))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
    }
}

/// A live connection owned by the table.
pub trait Transport: Send {
    /// Send one binary frame. Only called while the connection is open.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Request the connection close. Must not block.
    fn close(&mut self);
}

/// Builds transports. Construction either fails synchronously (bad endpoint)
/// or returns a transport whose progress is reported through `events`.
pub trait Connector: Send {
    fn connect(&mut self, endpoint: &str, events: EventSink) -> Result<Box<dyn Transport>>;
}

/// Validate an endpoint the way the browser `WebSocket` constructor does.
pub fn parse_endpoint(endpoint: &str) -> Result<url::Url> {
    let url = url::Url::parse(endpoint).map_err(|e| WsError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(WsError::UnsupportedScheme(other.to_string())),
    }

    if url.fragment().is_some() {
        return Err(WsError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "fragments are not allowed".to_string(),
        });
    }

    Ok(url)
}
