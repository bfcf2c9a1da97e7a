//! Relay protocol message types.
//!
//! This module defines the messages exchanged between the native relay and
//! the adapter script running inside the web runtime.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Native → Script | Adapter command + rendered script |
//! | `Response` | Script → Native | Evaluation outcome |
//! | `InboundMessage` | Script → Native | Lifecycle tag, data payload, hub event |
//!
//! # Command Naming
//!
//! Commands follow `module.methodName` format:
//!
//! - `connection.initialize`
//! - `hub.addHandler`
//! - `hub.invoke`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Adapter command definitions |
//! | `marshal` | Script literal rendering |
//! | `message` | Inbound message parsing |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Adapter command definitions.
pub mod command;

/// Native value to script text conversion.
pub mod marshal;

/// Inbound message-channel bodies.
pub mod message;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use message::{DISCONNECTED_TAG, HubEvent, InboundMessage, Lifecycle, READY_TAG};
pub use request::{Request, Response, ResponseType};
