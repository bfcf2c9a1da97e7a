//! WebSocket server for socket-relayed pages.
//!
//! # Connection Flow
//!
//! 1. Bind to `localhost:0` (random port)
//! 2. Page is opened with a prelude pointing at the WebSocket URL
//! 3. Page prelude connects to the server
//! 4. Server upgrades the stream and hands it to the relay

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

use crate::error::{Error, Result};

// ============================================================================
// PendingServer
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use hub_relay::transport::PendingServer;
///
/// let server = PendingServer::bind_localhost().await?;
/// let ws_url = server.ws_url();
///
/// // Open the page with ws_url...
///
/// let ws_stream = server.accept(Duration::from_secs(30)).await?;
/// ```
#[derive(Debug)]
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

    /// Binds to `127.0.0.1` on a random port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_localhost() -> Result<Self> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await
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
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accepts one page connection and upgrades it to WebSocket.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if nothing connects within `wait`
    /// - [`Error::WebSocket`] if the WebSocket upgrade fails
    pub async fn accept(self, wait: Duration) -> Result<WebSocketStream<TcpStream>> {
        let (stream, peer) = timeout(wait, self.listener.accept())
            .await
            .map_err(|_| Error::connection_timeout(wait.as_millis() as u64))??;

        debug!(?peer, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream).await?;

        info!(port = self.addr.port(), "Page socket connected");

        Ok(ws_stream)
    }
}

// ============================================================================
// Tests
// ============================================================================
