use async_channel::{Receiver, Sender, unbounded};
use bevy::prelude::*;
use tracing::warn;

/// Work scheduled onto the owner context.
type OwnerJob = Box<dyn FnOnce(&mut World) + Send + 'static>;

/// The single synchronization primitive between feed threads, transports
/// and the owner context.
///
/// Any thread may call [`schedule`](OwnerBridge::schedule) concurrently;
/// jobs are queued FIFO and run to completion, one at a time, by
/// [`drain_owner_queue`] on the owner context. All state mutation and all
/// viewer notification happens inside these jobs, which is what makes the
/// rest of the engine lock-free.
#[derive(Resource, Clone)]
pub struct OwnerBridge {
    sender: Sender<OwnerJob>,
    receiver: Receiver<OwnerJob>,
}

impl OwnerBridge {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self { sender, receiver }
    }

    /// Queue a closure to run on the owner context. Never blocks.
    pub fn schedule(&self, job: impl FnOnce(&mut World) + Send + 'static) {
        // An unbounded channel only rejects sends once the receiver is gone,
        // i.e. the owner context has shut down.
        if self.sender.try_send(Box::new(job)).is_err() {
            warn!("Owner context has shut down; dropping scheduled work");
        }
    }

    /// Number of jobs waiting to run. Primarily useful for testing and
    /// diagnostics.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for OwnerBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive system that drains the bridge queue on the owner context.
///
/// Runs in `PreUpdate` so mutations land before any same-frame systems
/// observe the models.
pub fn drain_owner_queue(world: &mut World) {
    let receiver = world.resource::<OwnerBridge>().receiver.clone();

    while let Ok(job) = receiver.try_recv() {
        job(world);
    }
}
