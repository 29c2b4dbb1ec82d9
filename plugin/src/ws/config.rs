//! Native connector configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ws::error::Result;

/// Settings for the native connector.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use bevy_quad_ws::ConnectorConfig;
///
/// let config = ConnectorConfig::from_json(r#"{ "protocols": ["game-v1"] }"#).unwrap();
/// assert_eq!(config.protocols, vec!["game-v1".to_string()]);
/// assert_eq!(config.connect_timeout_ms, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// `Origin` header sent with the handshake.
    pub origin: Option<String>,
    /// Offered subprotocols (`Sec-WebSocket-Protocol`).
    pub protocols: Vec<String>,
    /// Time allowed for TCP connect plus handshake.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            origin: None,
            protocols: Vec::new(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl ConnectorConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
