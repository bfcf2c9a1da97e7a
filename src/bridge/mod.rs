//! Hub relay bridge.
//!
//! This module provides the main entry point: a [`Connection`] that drives
//! the hub client inside a script host, and the [`HubProxy`] facades created
//! on it.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Connection`] | Owns the script host and its event loop |
//! | [`ConnectionBuilder`] | Fluent configuration builder |
//! | [`ConnectionOptions`] | URL, type, page and timeouts |
//! | [`ConnectionState`] | Observable lifecycle |
//! | [`HubProxy`] | Named hub with client method callbacks |
//! | [`Evaluation`] | Outcome of one queued command |
//!
//! # Example
//!
//! ```no_run
//! use hub_relay::{ConnectionType, MemoryHost, Result};
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let connection = hub_relay::connect(
//!     MemoryHost::new(),
//!     "https://example.com/signalr",
//!     ConnectionType::Hub,
//!     |_| {},
//! )?;
//!
//! let chat = connection.create_hub_proxy("chat")?;
//! let _ = chat.on("receiveMessage", |arguments| println!("{arguments:?}"))?;
//!
//! connection.wait_ready().await?;
//! chat.invoke("send", &[json!("hello")])?.await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for connection configuration.
pub mod builder;

/// Connection and event loop.
pub mod core;

/// Pending evaluation handle.
pub mod evaluation;

/// Hub proxy.
pub mod hub;

/// Connection type and options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use core::{Connection, ConnectionState, DisconnectedCallback, ReadyCallback, ReceivedCallback};
pub use evaluation::Evaluation;
pub use hub::{HubHandler, HubProxy};
pub use options::{ConnectionOptions, ConnectionType, DEFAULT_EVALUATION_TIMEOUT};
