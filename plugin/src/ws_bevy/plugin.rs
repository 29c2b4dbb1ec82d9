//! WebSocket Bevy Plugin Implementation

use bevy::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::ws::{ConnectionTable, Connector, Handle, WsState};

/// Last pumped state of every connection.
///
/// The table itself is a non-send resource; this mirror lets ordinary
/// (parallel) systems watch connection state.
#[derive(Resource, Debug, Default, Clone)]
pub struct ConnectionStates {
    states: HashMap<Handle, WsState>,
}

impl ConnectionStates {
    pub fn get(&self, handle: Handle) -> WsState {
        self.states
            .get(&handle)
            .copied()
            .unwrap_or(WsState::NotExisting)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, WsState)> + '_ {
        self.states.iter().map(|(h, s)| (*h, *s))
    }

    fn update(&mut self, handle: Handle, state: WsState) -> Option<WsState> {
        self.states.insert(handle, state)
    }
}

/// Bevy plugin for WebSocket connections.
///
/// This plugin:
/// - Inserts a `ConnectionTable` as a non-send resource
/// - Applies transport events to it in `PreUpdate`
/// - Mirrors connection states into `ConnectionStates`
///
/// ## Usage
///
/// ```ignore
/// App::new()
///     .add_plugins(QuadWsPlugin::new())
///     .add_systems(Update, |mut table: NonSendMut<ConnectionTable>| { /* ... */ })
///     .run();
/// ```
pub struct QuadWsPlugin {
    /// Taken when the plugin is built (wrapped for interior mutability).
    connector: Mutex<Option<Box<dyn Connector>>>,
}

impl QuadWsPlugin {
    /// Plugin with the native connector and default settings.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new() -> Self {
        Self::with_config(crate::ws::ConnectorConfig::default())
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn with_config(config: crate::ws::ConnectorConfig) -> Self {
        Self::with_connector(crate::ws::TungsteniteConnector::new(config))
    }

    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Mutex::new(Some(Box::new(connector))),
        }
    }

    fn take_connector(&self) -> Option<Box<dyn Connector>> {
        self.connector.lock().ok().and_then(|mut guard| guard.take())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for QuadWsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for QuadWsPlugin {
    fn build(&self, app: &mut App) {
        let Some(connector) = self.take_connector() else {
            log::error!("QuadWsPlugin has no connector left; was it built twice?");
            return;
        };

        app.insert_non_send_resource(ConnectionTable::from_boxed(connector));
        app.init_resource::<ConnectionStates>();
        app.add_systems(PreUpdate, pump_connection_table);

        log::info!("WebSocket plugin configured");
    }
}

/// Apply queued transport events and mirror the resulting states.
fn pump_connection_table(
    mut table: NonSendMut<ConnectionTable>,
    mut states: ResMut<ConnectionStates>,
) {
    table.pump_events();

    for handle in table.handles() {
        let state = table.last_known_state(handle);
        if states.get(handle) != state {
            log::info!("[WebSocket {}] {} -> {}", handle, states.get(handle), state);
            states.update(handle, state);
        }
    }
}
