//! Newline-delimited-JSON TCP transport for dashboard viewers.
//!
//! The accept loop runs on the runtime's task pool and hands accepted
//! streams back over a channel; [`handle_new_viewer_connections`] drains
//! that channel on the owner context, attaches a listener per stream and
//! spawns its send/receive tasks. Disconnect detaches the listener; the
//! hub itself never detaches anyone.

use std::net::SocketAddr;
use std::sync::Arc;

use async_channel::{Receiver, Sender, bounded};
use async_net::{TcpListener, TcpStream};
use bevy::prelude::*;
use futures_lite::{AsyncBufReadExt, AsyncWriteExt, StreamExt, io::BufReader};
use tracing::{debug, error, info, warn};

use dashlink_common::{DashboardError, ListenerId};

use crate::hub::ViewerListener;
use crate::{AsyncChannel, DashboardHandle, DashboardRuntime};

/// Settings for the viewer transport.
#[derive(Clone, Debug, Resource)]
pub struct ViewerSettings {
    /// Maximum accepted command line length in bytes; longer lines are
    /// dropped with a warning.
    ///
    /// ## Default
    /// The default is set to 64KiB
    pub max_line_length: usize,
    /// Channel capacity for outgoing events per viewer (default: 500)
    ///
    /// Events beyond this are dropped for that viewer only, with a
    /// warning from the hub.
    pub channel_capacity: usize,
    /// Warn when a viewer's channel depth exceeds this percentage
    /// (default: 80)
    pub channel_warning_threshold: u8,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            max_line_length: 64 * 1024,
            channel_capacity: 500,
            channel_warning_threshold: 80,
        }
    }
}

/// Holds the channel between the accept loop and the owner context.
#[derive(Resource)]
pub struct ViewerTransport {
    new_connections: AsyncChannel<TcpStream>,
}

impl ViewerTransport {
    pub(crate) fn new() -> Self {
        Self {
            new_connections: AsyncChannel::new(),
        }
    }

    /// Start accepting viewer connections on `addr`.
    ///
    /// ## Note
    /// Binding happens on the task pool; a bind failure is logged, not
    /// returned.
    pub fn listen(&self, addr: SocketAddr, pool: &bevy::tasks::TaskPool) {
        let new_connections = self.new_connections.sender.clone();

        pool.spawn(async move {
            if let Err(err) = accept_loop(addr, new_connections).await {
                error!("Viewer transport stopped: {}", err);
            }
        })
        .detach();
    }
}

/// Accepts viewer connections until the owner side hangs up.
async fn accept_loop(
    addr: SocketAddr,
    new_connections: Sender<TcpStream>,
) -> Result<(), DashboardError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(DashboardError::Listen)?;
    info!("Listening for viewers on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Viewer connection from {}", peer);
                if new_connections.send(stream).await.is_err() {
                    return Ok(());
                }
            }
            Err(err) => {
                error!("Error accepting viewer connection: {}", err);
            }
        }
    }
}

/// System that attaches newly accepted viewer streams.
///
/// Runs every frame in `PreUpdate`; idles quietly until the runtime and
/// transport resources exist.
pub fn handle_new_viewer_connections(
    transport: Option<Res<ViewerTransport>>,
    handle: Option<Res<DashboardHandle>>,
    runtime: Option<Res<DashboardRuntime>>,
    settings: Option<Res<ViewerSettings>>,
) {
    let (Some(transport), Some(handle), Some(runtime)) = (transport, handle, runtime) else {
        return;
    };
    let settings = settings.map(|s| s.clone()).unwrap_or_default();

    while let Ok(stream) = transport.new_connections.receiver.try_recv() {
        let id = handle.allocate_listener_id();
        let (outbound, outbound_rx) = bounded(settings.channel_capacity);

        // Registration goes through the bridge so the snapshot and all
        // later notifications reach this viewer in one consistent order.
        handle.register_listener(ViewerListener::new(id, outbound));

        runtime
            .0
            .spawn(send_loop(stream.clone(), outbound_rx, settings.clone()))
            .detach();
        runtime
            .0
            .spawn(recv_loop(stream, id, handle.clone(), settings.clone()))
            .detach();
    }
}

async fn recv_loop(
    stream: TcpStream,
    id: ListenerId,
    handle: DashboardHandle,
    settings: ViewerSettings,
) {
    let mut lines = BufReader::new(stream).lines();

    while let Some(result) = lines.next().await {
        match result {
            Ok(line) => {
                if line.len() > settings.max_line_length {
                    warn!(
                        "Dropping oversized command ({} bytes) from {}",
                        line.len(),
                        id
                    );
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                handle.submit_viewer_command(id, line);
            }
            Err(err) => {
                error!("Encountered error reading from {}: {}", id, err);
                break;
            }
        }
    }

    info!("{} disconnected", id);
    handle.unregister_listener(id);
}

async fn send_loop(mut stream: TcpStream, events: Receiver<Arc<str>>, settings: ViewerSettings) {
    let warning_threshold = settings.channel_warning_threshold;
    let channel_capacity = settings.channel_capacity;

    while let Ok(payload) = events.recv().await {
        // Monitor channel depth and warn if this viewer falls behind.
        let current_depth = events.len();
        let capacity = events.capacity().unwrap_or(channel_capacity);
        let depth_percentage = (current_depth as f32 / capacity as f32 * 100.0) as u8;
        if depth_percentage >= warning_threshold {
            warn!(
                "Viewer channel depth at {}% ({}/{} events). Viewer may be too slow to keep up!",
                depth_percentage, current_depth, capacity
            );
        }

        let mut buffer = Vec::with_capacity(payload.len() + 1);
        buffer.extend_from_slice(payload.as_bytes());
        buffer.push(b'\n');

        if let Err(err) = stream.write_all(&buffer).await {
            error!("Could not write to viewer: {}", err);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;

    #[test]
    fn bind_failure_surfaces_listen_error() {
        block_on(async {
            let taken = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
                .await
                .expect("bind ephemeral port");
            let addr = taken.local_addr().expect("local addr");

            let channel = AsyncChannel::new();
            match accept_loop(addr, channel.sender.clone()).await {
                Err(DashboardError::Listen(_)) => {}
                other => panic!("expected listen error, got {:?}", other),
            }
        });
    }
}
