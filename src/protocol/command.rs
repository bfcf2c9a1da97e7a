//! Adapter commands.
//!
//! Each variant is one capability the adapter script exposes inside the web
//! runtime. Commands follow `module.methodName` naming for their serialized
//! form and render to the evaluation string the adapter expects.
//!
//! # Command Modules
//!
//! | Module | Commands | Rendered script |
//! |--------|----------|-----------------|
//! | `connection` | `initialize` | `initialize('<url>', true)` |
//! | `connection` | `start` | `start()` |
//! | `connection` | `send` | `connection.send(<payload>)` |
//! | `connection` | `setQueryString` | `connection.qs = <json>` |
//! | `hub` | `ensure` | `if (typeof H == 'undefined') H = connection.createHubProxy('H')` |
//! | `hub` | `addHandler` | `addHandler(H, '<method>', null)` |
//! | `hub` | `invoke` | `H.invoke('<method>', <args>)` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::marshal::{js_string, js_string_array, js_value, validate_identifier};

// ============================================================================
// Command
// ============================================================================

/// A call into the adapter script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Command {
    /// Create the underlying connection object.
    #[serde(rename = "connection.initialize")]
    Initialize {
        /// Target URL.
        url: String,
        /// `true` for hub-style connections.
        #[serde(rename = "isHub")]
        is_hub: bool,
    },

    /// Start the underlying connection.
    #[serde(rename = "connection.start")]
    Start,

    /// Send a payload over a persistent connection.
    #[serde(rename = "connection.send")]
    Send {
        /// Payload.
        data: Value,
    },

    /// Replace the connection query string.
    #[serde(rename = "connection.setQueryString")]
    SetQueryString {
        /// New query string value.
        value: Value,
    },

    /// Create the script-side hub proxy if it does not exist yet.
    #[serde(rename = "hub.ensure")]
    EnsureHub {
        /// Hub name (script identifier).
        hub: String,
    },

    /// Register a client method on a hub.
    #[serde(rename = "hub.addHandler")]
    AddHandler {
        /// Hub name (script identifier).
        hub: String,
        /// Client method name.
        method: String,
        /// Declared parameter names (optional).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<Vec<String>>,
    },

    /// Invoke a server method on a hub.
    #[serde(rename = "hub.invoke")]
    Invoke {
        /// Hub name (script identifier).
        hub: String,
        /// Server method name.
        method: String,
        /// Arguments, serialized one by one.
        #[serde(default)]
        arguments: Vec<Value>,
    },
}

impl Command {
    /// Returns the `module.methodName` form of this command.
    #[must_use]
    pub const fn method_name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "connection.initialize",
            Self::Start => "connection.start",
            Self::Send { .. } => "connection.send",
            Self::SetQueryString { .. } => "connection.setQueryString",
            Self::EnsureHub { .. } => "hub.ensure",
            Self::AddHandler { .. } => "hub.addHandler",
            Self::Invoke { .. } => "hub.invoke",
        }
    }

    /// Returns the hub this command targets, if any.
    #[must_use]
    pub fn hub(&self) -> Option<&str> {
        match self {
            Self::EnsureHub { hub } | Self::AddHandler { hub, .. } | Self::Invoke { hub, .. } => {
                Some(hub.as_str())
            }
            _ => None,
        }
    }

    /// Renders the command as an evaluation string for the adapter script.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifier`](crate::Error::InvalidIdentifier) if a hub
    ///   name is not a script identifier
    /// - [`Error::Json`](crate::Error::Json) if a payload fails to serialize
    pub fn to_script(&self) -> Result<String> {
        if let Some(hub) = self.hub() {
            validate_identifier(hub)?;
        }

        let script = match self {
            Self::Initialize { url, is_hub } => {
                format!("initialize({}, {is_hub})", js_string(url))
            }
            Self::Start => "start()".to_string(),
            Self::Send { data } => format!("connection.send({})", js_value(data)?),
            Self::SetQueryString { value } => {
                format!("connection.qs = {}", serde_json::to_string(value)?)
            }
            Self::EnsureHub { hub } => format!(
                "if (typeof {hub} == 'undefined') {hub} = connection.createHubProxy({})",
                js_string(hub)
            ),
            Self::AddHandler {
                hub,
                method,
                parameters,
            } => format!(
                "addHandler({hub}, {}, {})",
                js_string(method),
                js_string_array(parameters.as_deref())
            ),
            Self::Invoke {
                hub,
                method,
                arguments,
            } => {
                let mut script = format!("{hub}.invoke({}", js_string(method));
                if !arguments.is_empty() {
                    let rendered = arguments
                        .iter()
                        .map(js_value)
                        .collect::<Result<Vec<_>>>()?;
                    script.push_str(", ");
                    script.push_str(&rendered.join(","));
                }
                script.push(')');
                script
            }
        };

        Ok(script)
    }
}

// ============================================================================
// Tests
// ============================================================================
