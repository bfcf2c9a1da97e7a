//! Script host transport layer.
//!
//! This module defines how the relay reaches a web runtime and provides
//! two hosts out of the box.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   Request / Result    ┌─────────────────┐
//! │  Connection     │──────────────────────►│  ScriptHost     │
//! │  (event loop)   │                       │  (web runtime)  │
//! │                 │◄──────────────────────│                 │
//! └─────────────────┘   MessageSink posts   └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `host` | [`ScriptHost`] trait and [`MessageSink`] |
//! | `memory` | [`MemoryHost`], a recording in-process host |
//! | `relay` | WebSocket relay and event loop |
//! | `server` | WebSocket server binding and acceptance |
//! | `socket` | [`SocketHost`], a page reached over a WebSocket |

// ============================================================================
// Submodules
// ============================================================================

/// Script host capability trait.
pub mod host;

/// In-process recording host.
pub mod memory;

/// WebSocket relay and event loop.
pub mod relay;

/// WebSocket server for relayed pages.
pub mod server;

/// Script host reached over a WebSocket.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use host::{MessageSink, ScriptHost};
pub use memory::MemoryHost;
pub use relay::Relay;
pub use server::PendingServer;
pub use socket::{PageOpener, SocketHost, SocketHostOptions};
