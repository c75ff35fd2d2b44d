//! WebSocket server the engine connects to.
//!
//! # Connection Flow
//!
//! 1. Bind the server to `localhost:0` (random port)
//! 2. Launch the engine host with the WebSocket URL
//! 3. The engine connects; the TCP stream is upgraded to WebSocket
//! 4. The resulting [`Connection`] becomes the engine's [`Transport`](super::Transport)

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for waiting for the engine to connect.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PendingServer
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use sharer_bridge::transport::PendingServer;
///
/// let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// let ws_url = server.ws_url();
///
/// // Launch the engine host with ws_url...
///
/// let connection = server.accept().await?;
/// ```
pub struct PendingServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the server is bound to.
    addr: SocketAddr,
}

impl PendingServer {
    /// Binds a WebSocket server to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        debug!(port = addr.port(), "WebSocket server bound");

        Ok(Self { listener, addr })
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the WebSocket URL for this server.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accepts the engine's connection using the default 30s timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the engine doesn't connect in time
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    pub async fn accept(self) -> Result<Connection> {
        self.accept_with_timeout(CONNECTION_TIMEOUT).await
    }

    /// Accepts the engine's connection with a custom timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the engine doesn't connect in time
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    pub async fn accept_with_timeout(self, wait: Duration) -> Result<Connection> {
        let (stream, addr) = timeout(wait, self.listener.accept())
            .await
            .map_err(|_| Error::connection_timeout(wait))??;

        debug!(?addr, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(port = self.addr.port(), "Engine connected");

        Ok(Connection::new(ws_stream))
    }
}

// ============================================================================
// Tests
// ============================================================================
