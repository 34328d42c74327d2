//! Headless dashboard server fed by synthetic telemetry. Stands in for a
//! deployment where the feeds come from a real robot link.
//!
//! Connect with `nc 127.0.0.1 9763` and send command lines such as
//! `{"command":"forward"}` or `{"isPathModuleActive":true}`.

use std::net::SocketAddr;
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use bevy::tasks::TaskPoolBuilder;
use serde_json::json;

use dashlink::{
    CommandOutbox, DashboardHandle, DashboardPlugin, DashboardRuntime, FeedKind,
    viewer_tcp::ViewerTransport,
};

fn main() {
    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / 60.0,
        ))),
    );
    app.add_plugins(bevy::log::LogPlugin::default());
    app.add_plugins(DashboardPlugin);
    app.insert_resource(DashboardRuntime(
        TaskPoolBuilder::new().num_threads(2).build(),
    ));
    app.add_systems(Startup, setup);
    app.add_systems(Update, relay_robot_commands);
    app.run();
}

fn setup(
    transport: Res<ViewerTransport>,
    runtime: Res<DashboardRuntime>,
    handle: Res<DashboardHandle>,
) {
    let addr: SocketAddr = ([127, 0, 0, 1], 9763).into();
    transport.listen(addr, &runtime.0);

    let handle = handle.clone();
    std::thread::spawn(move || feed_telemetry(handle));
}

/// Synthetic stand-in for the robot's feed callbacks. Runs on its own
/// thread, like real feed subscriptions would.
fn feed_telemetry(handle: DashboardHandle) {
    handle.set_robot_online(true);

    // Latched static map: a small room with one wall segment.
    let mut grid = vec![0i64; 32 * 32];
    for col in 8..24 {
        grid[16 * 32 + col] = 100;
    }
    handle.ingest_telemetry(
        FeedKind::MapStatic,
        json!({
            "info": {"resolution": 0.05, "width": 32, "height": 32},
            "data": grid,
        }),
    );

    handle.ingest_telemetry(FeedKind::StatusWifi, json!({"data": true}));
    handle.ingest_telemetry(FeedKind::StatusComms, json!({"value": true}));
    handle.ingest_telemetry(FeedKind::StatusPi, json!(true));
    handle.ingest_telemetry(FeedKind::PathDockStatus, json!({"is_docked": true}));

    let mut battery = 0.98f64;
    let mut tick = 0u64;
    loop {
        let angle = tick as f64 / 20.0;
        handle.ingest_telemetry(
            FeedKind::MapOdometry,
            json!({
                "pose": {"pose": {
                    "position": {"x": angle.cos() * 0.4, "y": angle.sin() * 0.4},
                    "orientation": {"z": (angle / 2.0).sin(), "w": (angle / 2.0).cos()},
                }}
            }),
        );

        if tick % 10 == 0 {
            handle.ingest_telemetry(FeedKind::StatusBattery, json!({"percentage": battery}));
            battery = (battery - 0.001).max(0.05);
        }

        tick += 1;
        std::thread::sleep(Duration::from_millis(200));
    }
}

/// Logs what a real deployment would republish to the robot.
fn relay_robot_commands(outbox: Res<CommandOutbox>) {
    while let Ok(command) = outbox.try_recv() {
        info!("Robot command: {:?}", command);
    }
}
