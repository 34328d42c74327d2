use crate::ListenerId;
use thiserror::Error;

/// Errors surfaced by the dashboard engine.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// A listener's outbound queue is full; the payload was dropped for
    /// that listener only.
    #[error("outbound queue full for {0}")]
    ListenerBusy(ListenerId),
    /// A listener's outbound channel is closed (its connection is gone).
    #[error("outbound channel closed for {0}")]
    ListenerClosed(ListenerId),
    /// A payload could not be serialized or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The viewer transport could not bind its listen address.
    #[error("error listening for viewers: {0}")]
    Listen(std::io::Error),
}
