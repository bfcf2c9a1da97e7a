//! Hub Relay - native bridge to a real-time hub client in a web runtime.
//!
//! This library loads a page carrying a real-time push protocol client (the
//! jQuery SignalR client by default) into an embedded script host, and
//! relays messages between native code and that client.
//!
//! # Architecture
//!
//! The relay follows a command/message model:
//!
//! - **Native end (Rust)**: queues typed commands, dispatches posted messages
//! - **Script end (adapter)**: executes commands, posts lifecycle signals,
//!   data and hub events through a named message handler
//!
//! Key design principles:
//!
//! - Each [`Connection`] owns: one script host + one event loop task
//! - Commands use `module.methodName` naming and render to the exact
//!   evaluation strings the adapter script expects
//! - Every interpolated string is escaped; hub names must be identifiers
//! - Every outbound call returns an [`Evaluation`] carrying its outcome
//!
//! # Quick Start
//!
//! ```no_run
//! use hub_relay::{ConnectionType, MemoryHost, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let host = MemoryHost::new();
//!
//!     let connection = hub_relay::connect(
//!         host.clone(),
//!         "https://example.com/signalr",
//!         ConnectionType::Hub,
//!         |connection| {
//!             let _ = connection.set_query_string(&json!({"token": "abc"}));
//!         },
//!     )?;
//!
//!     let chat = connection.create_hub_proxy("chat")?;
//!     let _ = chat.on("receiveMessage", |arguments| println!("{arguments:?}"))?;
//!
//!     connection.wait_ready().await?;
//!     chat.invoke("send", &[json!("hello")])?.await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | [`Connection`], [`HubProxy`] and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`page`] | Relay page assembly |
//! | [`protocol`] | Commands, requests and inbound messages |
//! | [`transport`] | Script host trait and bundled hosts |

// ============================================================================
// Modules
// ============================================================================

/// Connection, hub proxies and configuration.
///
/// Use [`Connection::builder()`] or [`connect()`] to create a connection.
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Relay page assembly and bundled scripts.
pub mod page;

/// Adapter commands, request/response envelopes and inbound messages.
pub mod protocol;

/// Script host trait and bundled hosts.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    Connection, ConnectionBuilder, ConnectionOptions, ConnectionState, ConnectionType,
    Evaluation, HubProxy,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, RequestId};

// Page types
pub use page::{Page, PageBuilder, ScriptSource};

// Transport types
pub use transport::{MemoryHost, MessageSink, ScriptHost, SocketHost, SocketHostOptions};

// ============================================================================
// Functions
// ============================================================================

/// Connects to `url` through `host` with the default page.
///
/// Returns immediately; the page loads in the background. `on_ready` runs
/// once, after `initialize` and before `start`, on the connection's event
/// loop.
///
/// Must be called inside a tokio runtime.
///
/// # Errors
///
/// - [`Error::InvalidUrl`] if `url` does not parse
/// - [`Error::Config`] if there is no tokio runtime
pub fn connect<H, F>(
    host: H,
    url: &str,
    connection_type: ConnectionType,
    on_ready: F,
) -> Result<Connection>
where
    H: ScriptHost,
    F: FnOnce(&Connection) + Send + 'static,
{
    Connection::builder(url)
        .connection_type(connection_type)
        .on_ready(on_ready)
        .connect(host)
}
