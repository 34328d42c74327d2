#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::unwrap_used
)]
#![allow(clippy::type_complexity)]

/*!
State-synchronization engine between one robot and many dashboard viewers.

The engine mirrors live robot state (power, battery, connectivity, map,
path history, docking) to every attached viewer and republishes viewer
commands back toward the robot. All state lives on a single owner context
(a Bevy app); telemetry threads and transports reach it exclusively
through the [`OwnerBridge`], so models need no locks and every viewer
observes one consistent event order.

Add the [`DashboardPlugin`] to a headless Bevy app, insert a
[`DashboardRuntime`], and use the [`DashboardHandle`] resource from your
transports and feed workers:

```rust,no_run
use bevy::prelude::*;
use bevy::tasks::TaskPoolBuilder;
use dashlink::{DashboardPlugin, DashboardRuntime, viewer_tcp::ViewerTransport};

fn main() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(DashboardPlugin);
    app.insert_resource(DashboardRuntime(
        TaskPoolBuilder::new().num_threads(2).build(),
    ));
    app.add_systems(Startup, start_listening);
    app.run();
}

fn start_listening(transport: Res<ViewerTransport>, runtime: Res<DashboardRuntime>) {
    transport.listen(([127, 0, 0, 1], 9763).into(), &runtime.0);
}
```
*/

pub mod bridge;
pub mod commands;
pub mod gate;
pub mod hub;
pub mod raster;
pub mod state;
pub mod telemetry;
pub mod viewer_tcp;

pub use bridge::OwnerBridge;
pub use commands::CommandOutbox;
pub use hub::{ViewerHub, ViewerListener};
pub use state::{MapState, PathFlags, PathState, RobotState};
pub use telemetry::TelemetryIngest;
pub use viewer_tcp::ViewerSettings;

pub use dashlink_common::*;

pub use async_channel;

use async_channel::{Receiver, Sender, unbounded};
use bevy::prelude::*;
use serde_json::Value;
use tracing::warn;

pub(crate) struct AsyncChannel<T> {
    pub(crate) sender: Sender<T>,
    pub(crate) receiver: Receiver<T>,
}

impl<T> AsyncChannel<T> {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self { sender, receiver }
    }
}

/// The task pool background IO runs on (accept loops, per-viewer send and
/// receive tasks, feed workers).
#[derive(Resource)]
pub struct DashboardRuntime(pub bevy::tasks::TaskPool);

/// Clone-friendly facade bundling everything a transport or feed worker
/// needs. Inserted by [`DashboardPlugin`]; safe to hand to any thread.
#[derive(Resource, Clone)]
pub struct DashboardHandle {
    bridge: OwnerBridge,
    hub: ViewerHub,
    ingest: TelemetryIngest,
    outbound: Receiver<OutboundCommand>,
}

impl DashboardHandle {
    /// Allocate an id for a new viewer connection.
    pub fn allocate_listener_id(&self) -> ListenerId {
        self.hub.allocate_id()
    }

    /// Attach a viewer. Scheduled through the bridge so membership changes
    /// are ordered with notifications; on attach the new viewer alone
    /// receives a snapshot of the current state (status, map if present,
    /// poses, path).
    pub fn register_listener(&self, listener: ViewerListener) {
        let hub = self.hub.clone();
        self.bridge.schedule(move |world| {
            let id = listener.id();
            hub.attach(listener);

            let flags = world.resource::<PathState>().flags();
            let mut snapshot = vec![world.resource::<RobotState>().status_event(flags)];
            let map = world.resource::<MapState>();
            if let Some(event) = map.map_event() {
                snapshot.push(event);
            }
            snapshot.push(map.pose_event());
            snapshot.push(world.resource::<PathState>().path_event());

            for event in &snapshot {
                if let Err(err) = hub.send_to(id, event) {
                    warn!("Could not snapshot state to new viewer: {}", err);
                    break;
                }
            }
        });
    }

    /// Detach a viewer. Detaching an unknown id is a no-op.
    pub fn unregister_listener(&self, id: ListenerId) {
        let hub = self.hub.clone();
        self.bridge.schedule(move |_| hub.detach(id));
    }

    /// Decode and apply one telemetry message. Safe from any thread.
    pub fn ingest_telemetry(&self, feed: FeedKind, payload: Value) {
        self.ingest.ingest(feed, payload);
    }

    /// Apply one raw viewer command line on the owner context.
    pub fn submit_viewer_command(&self, source: ListenerId, line: String) {
        self.bridge
            .schedule(move |world| commands::dispatch_line(world, source, &line));
    }

    /// Mirror the upstream robot link state into the power flag.
    pub fn set_robot_online(&self, online: bool) {
        self.ingest.set_robot_online(online);
    }

    /// Receiver clone for the robot-side collaborator that republishes
    /// commands to the robot.
    pub fn outbound_commands(&self) -> Receiver<OutboundCommand> {
        self.outbound.clone()
    }

    /// Run arbitrary work on the owner context.
    pub fn schedule(&self, job: impl FnOnce(&mut World) + Send + 'static) {
        self.bridge.schedule(job);
    }
}

/// The plugin to add to your bevy [`App`] when you want to serve a robot
/// dashboard.
#[derive(Default, Copy, Clone, Debug)]
pub struct DashboardPlugin;

impl Plugin for DashboardPlugin {
    fn build(&self, app: &mut App) {
        let bridge = OwnerBridge::new();
        let hub = ViewerHub::new();
        let outbox = CommandOutbox::default();
        let ingest = TelemetryIngest::new(bridge.clone());

        app.insert_resource(RobotState::new(hub.clone()));
        app.insert_resource(MapState::new(hub.clone()));
        app.insert_resource(PathState::new(hub.clone(), outbox.sender()));
        app.insert_resource(DashboardHandle {
            bridge: bridge.clone(),
            hub: hub.clone(),
            ingest,
            outbound: outbox.receiver(),
        });
        app.insert_resource(bridge);
        app.insert_resource(hub);
        app.insert_resource(outbox);
        app.insert_resource(viewer_tcp::ViewerTransport::new());
        app.init_resource::<ViewerSettings>();

        app.add_systems(
            PreUpdate,
            (
                viewer_tcp::handle_new_viewer_connections,
                bridge::drain_owner_queue,
            )
                .chain(),
        );
    }
}
