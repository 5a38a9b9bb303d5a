//! Outbound UDP link to the control surface.
//!
//! The socket is bound to an ephemeral local port and `connect`ed to the
//! remote peer, so sends are a non-blocking `try_send` that can run inside a
//! synchronous state listener.  Delivery is fire-and-forget.

use std::net::SocketAddr;

use keyosc_core::{encode_message, OscMessage};
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, trace};

use crate::application::publish_status::{OscSink, PublishError};

/// Error type for building the outbound link.
#[derive(Debug, Error)]
pub enum SenderError {
    #[error("failed to resolve remote address {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote address {0} resolved to no socket address")]
    NoAddress(String),

    #[error("failed to open outbound socket to {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// [`OscSink`] writing one datagram per message to a fixed peer.
#[derive(Debug)]
pub struct UdpOscSender {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpOscSender {
    /// Resolves `remote` (`"host:port"`) and connects a UDP socket to it.
    ///
    /// # Errors
    ///
    /// Returns [`SenderError`] if the address does not resolve or the socket
    /// cannot be bound or connected.
    pub async fn connect(remote: &str) -> Result<Self, SenderError> {
        let remote_addr = lookup_host(remote)
            .await
            .map_err(|source| SenderError::Resolve {
                addr: remote.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| SenderError::NoAddress(remote.to_string()))?;

        let local: SocketAddr = if remote_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket_err = |source: std::io::Error| SenderError::Socket {
            addr: remote_addr,
            source,
        };
        let socket = UdpSocket::bind(local).await.map_err(socket_err)?;
        socket.connect(remote_addr).await.map_err(socket_err)?;

        debug!(remote = %remote_addr, "outbound OSC link ready");
        Ok(Self {
            socket,
            remote: remote_addr,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl OscSink for UdpOscSender {
    fn send(&self, message: &OscMessage) -> Result<(), PublishError> {
        let bytes = encode_message(message)?;
        self.socket.try_send(&bytes)?;
        trace!(address = %message.address, len = bytes.len(), "sent OSC message");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
