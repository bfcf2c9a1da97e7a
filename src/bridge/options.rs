//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use hub_relay::{ConnectionOptions, ConnectionType};
//!
//! let options = ConnectionOptions::new("wss://example/stream")
//!     .with_connection_type(ConnectionType::Persistent)
//!     .with_ready_timeout(Duration::from_secs(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::page::PageBuilder;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for one evaluation.
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionType
// ============================================================================

/// Kind of underlying connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Named remote-procedure hubs.
    #[default]
    Hub,
    /// A single raw bidirectional channel.
    Persistent,
}

impl ConnectionType {
    /// Returns `true` for hub-style connections.
    #[inline]
    #[must_use]
    pub const fn is_hub(self) -> bool {
        matches!(self, Self::Hub)
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hub => f.write_str("hub"),
            Self::Persistent => f.write_str("persistent"),
        }
    }
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Everything a connection needs besides its host and callbacks.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Target URL, passed to `initialize` as given.
    pub url: String,

    /// Hub-style or persistent.
    pub connection_type: ConnectionType,

    /// Page to load into the host.
    pub page: PageBuilder,

    /// Upper bound for each evaluation.
    pub evaluation_timeout: Duration,

    /// Upper bound for [`Connection::wait_ready`](crate::Connection::wait_ready).
    ///
    /// `None` waits forever.
    pub ready_timeout: Option<Duration>,

    /// Query string applied before the connection starts.
    pub query_string: Option<Value>,
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates hub-style options for `url` with the default page.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_type: ConnectionType::Hub,
            page: PageBuilder::new(),
            evaluation_timeout: DEFAULT_EVALUATION_TIMEOUT,
            ready_timeout: None,
            query_string: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the connection type.
    #[inline]
    #[must_use]
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    /// Sets the page builder.
    #[inline]
    #[must_use]
    pub fn with_page(mut self, page: PageBuilder) -> Self {
        self.page = page;
        self
    }

    /// Sets the evaluation timeout.
    #[inline]
    #[must_use]
    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = timeout;
        self
    }

    /// Sets the ready timeout.
    #[inline]
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Sets the initial query string.
    #[inline]
    #[must_use]
    pub fn with_query_string(mut self, value: Value) -> Self {
        self.query_string = Some(value);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Checks that the URL parses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`](crate::Error::InvalidUrl) otherwise.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url)?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
