//! Native connector built on tokio-tungstenite.
//!
//! Each transport runs as a task on a shared Tokio runtime and reports back
//! through its `EventSink`. Outbound frames reach the task over an unbounded
//! channel; the table only ever sends while the connection is open.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::ws::config::ConnectorConfig;
use crate::ws::error::{Result, WsError};
use crate::ws::transport::{Connector, EventSink, Transport, parse_endpoint};

/// Static Tokio runtime shared by every native transport.
pub(crate) static TOKIO: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("quad-ws")
        .build()
        .expect("Failed to build WebSocket runtime")
});

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

/// Connector that opens real sockets.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    config: ConnectorConfig,
}

impl TungsteniteConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }
}

impl Connector for TungsteniteConnector {
    fn connect(&mut self, endpoint: &str, events: EventSink) -> Result<Box<dyn Transport>> {
        let url = parse_endpoint(endpoint)?;
        if url.scheme() == "wss" && !cfg!(feature = "tls") {
            return Err(WsError::UnsupportedScheme("wss".to_string()));
        }

        let request = build_request(endpoint, &self.config)?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{}:{}", host, port);

        let (tx, rx) = mpsc::unbounded_channel();
        TOKIO.spawn(run_connection(
            addr,
            request,
            self.config.connect_timeout(),
            events,
            rx,
        ));

        Ok(Box::new(TungsteniteTransport { sender: tx }))
    }
}

struct TungsteniteTransport {
    sender: mpsc::UnboundedSender<Outgoing>,
}

impl Transport for TungsteniteTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.sender
            .send(Outgoing::Frame(data.to_vec()))
            .map_err(|_| WsError::Transport("connection task has ended".to_string()))
    }

    fn close(&mut self) {
        // The task may already be gone; nothing left to close then.
        let _ = self.sender.send(Outgoing::Close);
    }
}

fn build_request(endpoint: &str, config: &ConnectorConfig) -> Result<Request> {
    let mut request = endpoint
        .into_client_request()
        .map_err(|e| WsError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

    if let Some(origin) = &config.origin {
        let value = HeaderValue::from_str(origin)
            .map_err(|e| WsError::Config(format!("origin: {}", e)))?;
        request.headers_mut().insert("Origin", value);
    }

    if !config.protocols.is_empty() {
        let value = HeaderValue::from_str(&config.protocols.join(", "))
            .map_err(|e| WsError::Config(format!("protocols: {}", e)))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }

    Ok(request)
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn handshake(addr: &str, request: Request, events: &EventSink) -> std::result::Result<WsStream, String> {
    let id = events.handle();
    log::info!("[WebSocket {}] Connecting TCP to {}", id, addr);
    let tcp_stream = TcpStream::connect(addr)
        .await
        .map_err(|e| format!("TCP connection failed: {}", e))?;

    log::info!("[WebSocket {}] Performing WebSocket handshake", id);
    #[cfg(feature = "tls")]
    let connecting = tokio_tungstenite::client_async_tls(request, tcp_stream);
    #[cfg(not(feature = "tls"))]
    let connecting = tokio_tungstenite::client_async(request, MaybeTlsStream::Plain(tcp_stream));
    let (stream, response) = connecting
        .await
        .map_err(|e| format!("Handshake failed: {}", e))?;

    log::info!(
        "[WebSocket {}] Connected successfully (status: {})",
        id,
        response.status()
    );
    Ok(stream)
}

async fn run_connection(
    addr: String,
    request: Request,
    timeout: Duration,
    events: EventSink,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    let id = events.handle();

    let stream = match tokio::time::timeout(timeout, handshake(&addr, request, &events)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(message)) => {
            log::error!("[WebSocket {}] {}", id, message);
            events.error(message);
            events.closed(1006, "Connection failed");
            return;
        }
        Err(_) => {
            log::error!("[WebSocket {}] Connect timed out after {:?}", id, timeout);
            events.error(format!("Connect timed out after {:?}", timeout));
            events.closed(1006, "Connection timed out");
            return;
        }
    };

    events.opened();
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(Outgoing::Frame(data)) => {
                    if let Err(e) = write.send(Message::binary(data)).await {
                        log::error!("[WebSocket {}] Send error: {}", id, e);
                        events.error(e.to_string());
                        events.closed(1006, "Send failed");
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        log::debug!("[WebSocket {}] Close frame not sent: {}", id, e);
                    }
                    break;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    log::debug!("[WebSocket {}] Received text ({} bytes)", id, text.len());
                    events.message(text.as_str().as_bytes());
                }
                Some(Ok(Message::Binary(data))) => {
                    log::debug!("[WebSocket {}] Received binary ({} bytes)", id, data.len());
                    events.message(data.to_vec());
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1000, String::new()));
                    log::info!("[WebSocket {}] Received close: {} {}", id, code, reason);
                    events.closed(code, reason);
                    break;
                }
                Some(Err(e)) => {
                    log::error!("[WebSocket {}] Read error: {}", id, e);
                    events.error(e.to_string());
                    events.closed(1006, "Connection error");
                    break;
                }
                None => {
                    events.closed(1006, "Connection ended");
                    break;
                }
            },
        }
    }

    log::info!("[WebSocket {}] Connection ended", id);
}
