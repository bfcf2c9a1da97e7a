//! Inbound message-channel bodies.
//!
//! The adapter script posts one body per message. Bodies are parsed,
//! dispatched and discarded.
//!
//! # Message Shapes
//!
//! | Body | Parsed as |
//! |------|-----------|
//! | `"ready"` | [`Lifecycle::Ready`] |
//! | `"disconnected"` | [`Lifecycle::Disconnected`] |
//! | `{ "data": <any> }` | [`InboundMessage::Data`] |
//! | `{ "hub": "...", "method": "...", "arguments"?: <any> }` | [`InboundMessage::Hub`] |
//! | anything else | [`InboundMessage::Unrecognized`] |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Lifecycle tag posted when the adapter script has loaded.
pub const READY_TAG: &str = "ready";

/// Lifecycle tag posted when the underlying connection drops.
pub const DISCONNECTED_TAG: &str = "disconnected";

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle signals posted as bare strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Adapter script initialized; the relay may initialize and start.
    Ready,
    /// Underlying connection dropped.
    Disconnected,
}

// ============================================================================
// HubEvent
// ============================================================================

/// A client method call pushed by the server through a hub.
#[derive(Debug, Clone, PartialEq)]
pub struct HubEvent {
    /// Hub name as posted (matched case-insensitively).
    pub hub: String,
    /// Client method name (matched exactly).
    pub method: String,
    /// Arguments, if the adapter posted any.
    pub arguments: Option<Value>,
}

// ============================================================================
// InboundMessage
// ============================================================================

/// A parsed message-channel body.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Lifecycle signal.
    Lifecycle(Lifecycle),
    /// Generic payload received on the connection.
    Data(Value),
    /// Hub client method call.
    Hub(HubEvent),
    /// Any other shape; ignored by the relay.
    Unrecognized(Value),
}

impl InboundMessage {
    /// Classifies a posted body.
    ///
    /// A `data` key wins over `hub`. A `hub` body without a string `method`
    /// is unrecognized.
    #[must_use]
    pub fn parse(body: Value) -> Self {
        match body {
            Value::String(ref tag) if tag == READY_TAG => Self::Lifecycle(Lifecycle::Ready),
            Value::String(ref tag) if tag == DISCONNECTED_TAG => {
                Self::Lifecycle(Lifecycle::Disconnected)
            }
            Value::Object(mut map) => {
                if let Some(data) = map.remove("data") {
                    return Self::Data(data);
                }

                let hub = map.get("hub").and_then(Value::as_str).map(str::to_string);
                let method = map.get("method").and_then(Value::as_str).map(str::to_string);

                match (hub, method) {
                    (Some(hub), Some(method)) => Self::Hub(HubEvent {
                        hub,
                        method,
                        arguments: map.remove("arguments"),
                    }),
                    _ => Self::Unrecognized(Value::Object(map)),
                }
            }
            other => Self::Unrecognized(other),
        }
    }

    /// Returns a short label for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Lifecycle(Lifecycle::Ready) => "ready",
            Self::Lifecycle(Lifecycle::Disconnected) => "disconnected",
            Self::Data(_) => "data",
            Self::Hub(_) => "hub",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
