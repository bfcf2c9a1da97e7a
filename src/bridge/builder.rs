//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for configuring and creating [`Connection`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hub_relay::{Connection, MemoryHost};
//!
//! # fn example() -> hub_relay::Result<()> {
//! let connection = Connection::builder("https://example.com/signalr")
//!     .ready_timeout(Duration::from_secs(10))
//!     .on_ready(|connection| {
//!         println!("connection {} initialized", connection.id());
//!     })
//!     .connect(MemoryHost::new())?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::page::{PageBuilder, ScriptSource};
use crate::transport::ScriptHost;

use super::core::{Callbacks, Connection};
use super::options::{ConnectionOptions, ConnectionType};

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for configuring a [`Connection`].
///
/// Use [`Connection::builder()`] to create a new builder.
pub struct ConnectionBuilder {
    /// Connection options.
    options: ConnectionOptions,
    /// Callbacks installed before the event loop starts.
    callbacks: Callbacks,
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("options", &self.options)
            .field("on_ready", &self.callbacks.on_ready.is_some())
            .field("received", &self.callbacks.received.is_some())
            .field("on_disconnected", &self.callbacks.on_disconnected.is_some())
            .finish()
    }
}

// ============================================================================
// ConnectionBuilder Implementation
// ============================================================================

impl ConnectionBuilder {
    /// Creates a builder for a hub-style connection to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_options(ConnectionOptions::new(url))
    }

    /// Creates a builder from prepared options.
    #[must_use]
    pub fn from_options(options: ConnectionOptions) -> Self {
        Self {
            options,
            callbacks: Callbacks::default(),
        }
    }

    /// Sets the connection type.
    #[inline]
    #[must_use]
    pub fn connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.options.connection_type = connection_type;
        self
    }

    /// Makes this a persistent connection.
    #[inline]
    #[must_use]
    pub fn persistent(self) -> Self {
        self.connection_type(ConnectionType::Persistent)
    }

    /// Replaces the page builder.
    #[inline]
    #[must_use]
    pub fn page(mut self, page: PageBuilder) -> Self {
        self.options.page = page;
        self
    }

    /// Appends a protocol library to the page.
    #[inline]
    #[must_use]
    pub fn library(mut self, source: ScriptSource) -> Self {
        self.options.page = self.options.page.library(source);
        self
    }

    /// Replaces the adapter script.
    #[inline]
    #[must_use]
    pub fn adapter(mut self, source: ScriptSource) -> Self {
        self.options.page = self.options.page.adapter(source);
        self
    }

    /// Sets the base URL relative library paths resolve against.
    #[inline]
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.options.page = self.options.page.base_url(url);
        self
    }

    /// Sets the query string applied before the connection starts.
    #[inline]
    #[must_use]
    pub fn query_string(mut self, value: Value) -> Self {
        self.options.query_string = Some(value);
        self
    }

    /// Sets the per-evaluation timeout.
    #[inline]
    #[must_use]
    pub fn evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.options.evaluation_timeout = timeout;
        self
    }

    /// Bounds [`Connection::wait_ready`].
    #[inline]
    #[must_use]
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.options.ready_timeout = Some(timeout);
        self
    }

    /// Sets the callback run between `initialize` and `start`.
    #[inline]
    #[must_use]
    pub fn on_ready<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Connection) + Send + 'static,
    {
        self.callbacks.on_ready = Some(Box::new(callback));
        self
    }

    /// Sets the callback for generic `{ data }` payloads.
    #[inline]
    #[must_use]
    pub fn received<F>(mut self, callback: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.callbacks.received = Some(Arc::new(callback));
        self
    }

    /// Sets the callback for the `"disconnected"` signal.
    #[inline]
    #[must_use]
    pub fn on_disconnected<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_disconnected = Some(Arc::new(callback));
        self
    }

    /// Returns the options collected so far.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Loads the page into `host` and returns without waiting.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`](crate::Error::InvalidUrl) if the URL does not parse
    /// - [`Error::Config`](crate::Error::Config) if the page is incomplete or
    ///   there is no runtime
    pub fn connect<H: ScriptHost>(self, host: H) -> Result<Connection> {
        Connection::spawn(Arc::new(host), self.options, self.callbacks)
    }
}

// ============================================================================
// Tests
// ============================================================================
