use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_channel::{Sender, TrySendError};
use bevy::prelude::Resource;
use dashmap::DashMap;
use tracing::{error, warn};

use dashlink_common::{DashboardError, DashboardEvent, ListenerId};

/// Wraps one outbound viewer connection.
///
/// Payloads go into a bounded channel drained by the connection's own send
/// task, so one suspended socket never blocks another listener and
/// deliveries to a single listener stay strictly ordered.
#[derive(Clone)]
pub struct ViewerListener {
    id: ListenerId,
    outbound: Sender<Arc<str>>,
}

impl ViewerListener {
    pub fn new(id: ListenerId, outbound: Sender<Arc<str>>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Queue a payload for this listener. Never blocks; failure is
    /// reported, not thrown.
    pub fn deliver(&self, payload: Arc<str>) -> Result<(), DashboardError> {
        self.outbound.try_send(payload).map_err(|err| match err {
            TrySendError::Full(_) => DashboardError::ListenerBusy(self.id),
            TrySendError::Closed(_) => DashboardError::ListenerClosed(self.id),
        })
    }
}

/// Registry of attached viewers and the broadcast fan-out.
///
/// Cheap to clone; every state model holds one. Membership and delivery
/// are thread safe, but `notify` is only ever called from the owner
/// context, which is what gives viewers a single consistent event order.
#[derive(Resource, Clone)]
pub struct ViewerHub {
    listeners: Arc<DashMap<ListenerId, ViewerListener>>,
    next_id: Arc<AtomicU32>,
}

impl ViewerHub {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Allocate a listener id. Ids are never reused within a process.
    pub fn allocate_id(&self) -> ListenerId {
        ListenerId {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Attach a listener. Attaching an already-attached id replaces its
    /// adapter and grows nothing.
    pub fn attach(&self, listener: ViewerListener) {
        self.listeners.insert(listener.id(), listener);
    }

    /// Detach a listener. Detaching an unknown id is a no-op.
    pub fn detach(&self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Broadcast an event to every attached listener.
    ///
    /// The envelope is serialized once and the payload shared across
    /// listeners. A delivery failure is logged and skipped; it never
    /// aborts the remaining deliveries and never detaches the listener.
    /// Connection teardown is the transport's job.
    pub fn notify(&self, event: &DashboardEvent) {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json.as_str()),
            Err(err) => {
                error!("Could not serialize dashboard event: {}", err);
                return;
            }
        };

        for listener in self.listeners.iter() {
            if let Err(err) = listener.deliver(payload.clone()) {
                warn!("Could not deliver event to viewer: {}", err);
            }
        }
    }

    /// Deliver an event to a single listener, used for the per-listener
    /// snapshot on attach.
    pub fn send_to(&self, id: ListenerId, event: &DashboardEvent) -> Result<(), DashboardError> {
        let payload: Arc<str> = Arc::from(serde_json::to_string(event)?.as_str());
        match self.listeners.get(&id) {
            Some(listener) => listener.deliver(payload),
            None => Err(DashboardError::ListenerClosed(id)),
        }
    }
}

impl Default for ViewerHub {
    fn default() -> Self {
        Self::new()
    }
}
