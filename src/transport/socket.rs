//! Script host reached over a localhost WebSocket.
//!
//! Used when the web runtime lives outside the process (a browser, a
//! separate web view process). The page gets a prelude that connects back
//! to a local server; commands travel as [`Request`] frames and come back
//! as [`Response`](crate::protocol::Response) frames.
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Connection     │                              │  Relay page     │
//! │                 │         WebSocket            │                 │
//! │  SocketHost     │◄────────────────────────────►│  prelude        │
//! │  → Relay        │      localhost:PORT          │  + adapter      │
//! └─────────────────┘                              └─────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::page::Page;
use crate::page::assets::socket_prelude;
use crate::protocol::Request;

use super::host::{MessageSink, ScriptHost};
use super::relay::Relay;
use super::server::PendingServer;

// ============================================================================
// Constants
// ============================================================================

/// Default wait for the page to connect back.
const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for one response frame.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Opens the assembled page in some web runtime.
///
/// Typically navigates a browser or web view to [`Page::data_uri`].
pub type PageOpener = Box<dyn Fn(&Page) -> Result<()> + Send + Sync>;

/// Timeouts for a [`SocketHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHostOptions {
    /// How long to wait for the page to connect back.
    pub accept_timeout: Duration,
    /// How long to wait for each response frame.
    pub request_timeout: Duration,
}

impl Default for SocketHostOptions {
    fn default() -> Self {
        Self {
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Shared state behind every [`SocketHost`] clone.
struct SocketHostInner {
    /// Bound server, taken when the page loads.
    server: Mutex<Option<PendingServer>>,
    /// URL the prelude connects to.
    ws_url: String,
    /// Page opener.
    opener: PageOpener,
    /// Live relay, once the page connected.
    relay: Mutex<Option<Relay>>,
    /// Timeouts.
    options: SocketHostOptions,
}

impl Drop for SocketHostInner {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.lock().take() {
            relay.shutdown();
        }
    }
}

// ============================================================================
// SocketHost
// ============================================================================

/// A script host driving a page over a WebSocket.
///
/// # Example
///
/// ```ignore
/// use hub_relay::{Connection, SocketHost};
///
/// let host = SocketHost::bind(|page| {
///     open_in_webview(&page.data_uri());
///     Ok(())
/// })
/// .await?;
///
/// let connection = Connection::builder("https://example.com/signalr").connect(host)?;
/// connection.wait_ready().await?;
/// ```
#[derive(Clone)]
pub struct SocketHost {
    inner: Arc<SocketHostInner>,
}

impl fmt::Debug for SocketHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHost")
            .field("ws_url", &self.inner.ws_url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SocketHost {
    /// Binds a localhost server with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind<F>(opener: F) -> Result<Self>
    where
        F: Fn(&Page) -> Result<()> + Send + Sync + 'static,
    {
        Self::bind_with(opener, SocketHostOptions::default()).await
    }

    /// Binds a localhost server with custom timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_with<F>(opener: F, options: SocketHostOptions) -> Result<Self>
    where
        F: Fn(&Page) -> Result<()> + Send + Sync + 'static,
    {
        let server = PendingServer::bind_localhost().await?;
        let ws_url = server.ws_url();

        debug!(%ws_url, "Socket host bound");

        Ok(Self {
            inner: Arc::new(SocketHostInner {
                server: Mutex::new(Some(server)),
                ws_url,
                opener: Box::new(opener),
                relay: Mutex::new(None),
                options,
            }),
        })
    }

    /// Returns the URL the page prelude connects to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.inner.ws_url
    }

    /// Returns `true` once the page has connected back.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.relay.lock().is_some()
    }

    /// Closes the page socket.
    pub fn shutdown(&self) {
        if let Some(relay) = self.inner.relay.lock().take() {
            relay.shutdown();
        }
    }

    /// Returns the live relay.
    fn relay(&self) -> Result<Relay> {
        self.inner
            .relay
            .lock()
            .clone()
            .ok_or_else(|| Error::connection("Page has not connected"))
    }
}

#[async_trait]
impl ScriptHost for SocketHost {
    async fn load_page(&self, page: &Page, sink: MessageSink) -> Result<()> {
        let server = self
            .inner
            .server
            .lock()
            .take()
            .ok_or_else(|| Error::page_load("Socket host already served a page"))?;

        (self.inner.opener)(page).map_err(|e| Error::page_load(e.to_string()))?;

        let ws_stream = server.accept(self.inner.options.accept_timeout).await?;
        *self.inner.relay.lock() = Some(Relay::new(ws_stream, sink));

        info!(ws_url = %self.inner.ws_url, "Relay page connected");
        Ok(())
    }

    async fn execute(&self, request: &Request) -> Result<Value> {
        let relay = self.relay()?;
        relay
            .send(request.clone(), self.inner.options.request_timeout)
            .await?
            .into_result()
    }

    fn prelude(&self) -> Option<String> {
        Some(socket_prelude(&self.inner.ws_url))
    }
}

// ============================================================================
// Tests
// ============================================================================
