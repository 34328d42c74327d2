use async_channel::{Receiver, Sender, TryRecvError, bounded};
use bevy::prelude::*;
use tracing::{debug, warn};

use dashlink_common::{ListenerId, OutboundCommand, ViewerCommand};

use crate::state::{MapState, PathState, RobotState};

/// Bounded queue of commands headed for the robot. The robot-side
/// collaborator holds a receiver clone and drains it at its own pace.
#[derive(Resource)]
pub struct CommandOutbox {
    sender: Sender<OutboundCommand>,
    receiver: Receiver<OutboundCommand>,
}

impl CommandOutbox {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);

        Self { sender, receiver }
    }

    pub fn sender(&self) -> Sender<OutboundCommand> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> Receiver<OutboundCommand> {
        self.receiver.clone()
    }

    pub fn try_recv(&self) -> Result<OutboundCommand, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Default for CommandOutbox {
    fn default() -> Self {
        Self::new(500)
    }
}

/// Parse one raw viewer line and apply it. Runs on the owner context.
/// Unrecognized envelopes are logged and dropped.
pub(crate) fn dispatch_line(world: &mut World, source: ListenerId, line: &str) {
    match serde_json::from_str::<ViewerCommand>(line) {
        Ok(command) => {
            debug!("Command from {}: {:?}", source, command);
            dispatch(world, command);
        }
        Err(err) => {
            warn!("Unrecognized command from {}: {} ({})", source, line, err);
        }
    }
}

/// Apply one viewer command to the models. Runs on the owner context.
pub fn dispatch(world: &mut World, command: ViewerCommand) {
    match command {
        ViewerCommand::Drive { command } => {
            let outbox = world.resource::<CommandOutbox>();
            if let Err(err) = outbox.sender.try_send(OutboundCommand::Drive {
                twist: command.payload(),
            }) {
                warn!("Could not queue drive command: {}", err);
            }
        }
        ViewerCommand::SetPathModule {
            is_path_module_active,
        } => {
            world.resource_scope(|world, mut path: Mut<PathState>| {
                if path.set_path_module_active(is_path_module_active) {
                    if !is_path_module_active {
                        // The route overlay is stale once the module is off.
                        world.resource_mut::<MapState>().clear_route();
                    }
                    // The mode label derives from path activity.
                    world.resource::<RobotState>().notify_status(path.flags());
                }
            });
        }
        ViewerCommand::SetDock { dock_status } => {
            world.resource_scope(|world, mut path: Mut<PathState>| {
                if path.request_dock(dock_status) {
                    world.resource::<RobotState>().notify_status(path.flags());
                }
            });
        }
        ViewerCommand::Feedback { goal_id, feedback } => {
            world
                .resource_mut::<PathState>()
                .apply_feedback(&goal_id, &feedback);
        }
    }
}
