//! Inbound OSC listener.
//!
//! Binds a UDP socket and runs a receive loop on its own task.  Each datagram
//! is decoded and flattened into messages, and every message is routed on a
//! freshly spawned task: a command stuck waiting on the presentation
//! application never stops the loop from accepting the next datagram.
//!
//! Undecodable datagrams are logged and dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use keyosc_core::{decode_packet, flatten_packet};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::route_command::CommandRouter;

/// Largest datagram the listener accepts.
const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Error type for the inbound listener.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("failed to bind OSC listener on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A bound listener and its receive task.
#[derive(Debug)]
pub struct OscListener {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl OscListener {
    /// Binds `addr` (`"host:port"`) and starts receiving.
    ///
    /// # Errors
    ///
    /// Returns [`ListenError::BindFailed`] if the socket cannot be bound.
    pub async fn bind(addr: &str, router: Arc<CommandRouter>) -> Result<Self, ListenError> {
        let bind_err = |source: std::io::Error| ListenError::BindFailed {
            addr: addr.to_string(),
            source,
        };
        let socket = UdpSocket::bind(addr).await.map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        info!(%local_addr, "OSC listener bound");
        let task = tokio::spawn(receive_loop(socket, router));
        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the receive loop and waits until the socket is released.
    pub async fn shutdown(mut self) {
        self.task.abort();
        // An aborted task resolves once it has been dropped, socket included.
        let _ = (&mut self.task).await;
        info!(local_addr = %self.local_addr, "OSC listener stopped");
    }
}

impl Drop for OscListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn receive_loop(socket: UdpSocket, router: Arc<CommandRouter>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // e.g. ICMP port-unreachable surfacing as ECONNRESET on some platforms
                debug!(error = %e, "OSC receive error");
                tokio::task::yield_now().await;
                continue;
            }
        };

        let packet = match decode_packet(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(%peer, len, error = %e, "dropping undecodable datagram");
                continue;
            }
        };

        for message in flatten_packet(packet) {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.route(message).await });
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
