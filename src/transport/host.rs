//! Script host capability trait.
//!
//! A script host is the embedded web runtime: it loads the relay page,
//! executes adapter commands, and delivers bodies posted through the named
//! message handler into a [`MessageSink`].

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::page::Page;
use crate::protocol::Request;

// ============================================================================
// ScriptHost
// ============================================================================

/// An embedded web runtime the relay drives.
///
/// Implementations bind a concrete engine (an in-process web view, a remote
/// page over a socket, a test double). All calls come from the owning
/// connection's event loop, one at a time.
#[async_trait]
pub trait ScriptHost: Send + Sync + 'static {
    /// Loads the assembled page and starts forwarding posted messages.
    ///
    /// Implementations register [`Page::message_handler`] so that every body
    /// the page posts reaches `sink`, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be loaded; the connection then
    /// moves to [`ConnectionState::Failed`](crate::ConnectionState::Failed).
    async fn load_page(&self, page: &Page, sink: MessageSink) -> Result<()>;

    /// Executes one adapter command and returns its result.
    ///
    /// Text-evaluating hosts run [`Request::script`]; structured hosts may
    /// dispatch on [`Request::command`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptError`] if evaluation fails in the runtime.
    async fn execute(&self, request: &Request) -> Result<Value>;

    /// Returns a prelude that replaces the default native one.
    ///
    /// The prelude must define `window.hubRelay.post(body)`.
    fn prelude(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// MessageSink
// ============================================================================

/// Receiving end of the named message handler.
///
/// Cloneable; each clone feeds the same connection.
#[derive(Debug, Clone)]
pub struct MessageSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl MessageSink {
    /// Creates a sink and the receiver the event loop drains.
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers one posted body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is gone.
    pub fn post(&self, body: Value) -> Result<()> {
        self.tx.send(body).map_err(|_| Error::ConnectionClosed)
    }

    /// Delivers a body posted as text.
    ///
    /// JSON text is parsed; anything else (such as a bare `ready`) is
    /// delivered as a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is gone.
    pub fn post_text(&self, text: &str) -> Result<()> {
        let body = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
        self.post(body)
    }

    /// Returns `true` if the connection has stopped listening.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
