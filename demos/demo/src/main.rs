use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_quad_ws::{ConnectionTable, Handle, QuadWsPlugin, WsState};

/// Echo server to talk to, e.g. `websocat -s 7878`.
const ENDPOINT: &str = "ws://127.0.0.1:7878";

#[derive(Resource)]
struct Link(Handle);

fn main() {
    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(
            Duration::from_secs_f64(1.0 / 60.0),
        )))
        .add_plugins(LogPlugin::default())
        .add_plugins(QuadWsPlugin::new())
        .add_systems(Startup, connect)
        .add_systems(Update, (ping, print_frames, revive_on_drop))
        .run();
}

fn connect(mut commands: Commands, mut table: NonSendMut<ConnectionTable>) {
    match table.open(ENDPOINT) {
        Ok(handle) => commands.insert_resource(Link(handle)),
        Err(e) => error!("Failed to open {}: {}", ENDPOINT, e),
    }
}

fn ping(
    link: Option<Res<Link>>,
    mut table: NonSendMut<ConnectionTable>,
    time: Res<Time>,
    mut last: Local<f32>,
) {
    let Some(link) = link else {
        return;
    };
    if time.elapsed_secs() - *last < 1.0 {
        return;
    }
    *last = time.elapsed_secs();

    let message = format!("ping {:.0}", time.elapsed_secs());
    if table.write(link.0, message.as_bytes()).is_ok() {
        info!("Sent {}", message);
    }
}

fn print_frames(link: Option<Res<Link>>, mut table: NonSendMut<ConnectionTable>) {
    let Some(link) = link else {
        return;
    };
    while let Some(len) = table.available(link.0) {
        let mut buf = vec![0u8; len];
        if let Ok(count) = table.read(link.0, &mut buf) {
            info!("Received {}", String::from_utf8_lossy(&buf[..count]));
        }
    }
}

fn revive_on_drop(
    link: Option<Res<Link>>,
    mut table: NonSendMut<ConnectionTable>,
    time: Res<Time>,
    mut last: Local<f32>,
) {
    let Some(link) = link else {
        return;
    };
    if table.last_known_state(link.0) == WsState::Disconnected && time.elapsed_secs() - *last > 2.0 {
        *last = time.elapsed_secs();
        if let Err(e) = table.revive(link.0) {
            warn!("Revive failed: {}", e);
        }
    }
}
