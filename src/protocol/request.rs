//! Request and Response message types.
//!
//! Every outbound [`Command`] travels to the script host wrapped in a
//! [`Request`]. Hosts that evaluate text use [`Request::script`]; hosts that
//! relay frames send the whole request and answer with a [`Response`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::Command;

// ============================================================================
// Request
// ============================================================================

/// An evaluation request from the relay to the script host.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "method": "hub.invoke",
///   "params": { "hub": "chat", "method": "send", "arguments": ["hi"] },
///   "script": "chat.invoke('send', 'hi')"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,

    /// Rendered evaluation string for the adapter script.
    pub script: String,
}

impl Request {
    /// Creates a new request with auto-generated ID, rendering its script.
    ///
    /// # Errors
    ///
    /// Propagates rendering errors from [`Command::to_script`].
    pub fn new(command: Command) -> Result<Self> {
        Self::with_id(RequestId::generate(), command)
    }

    /// Creates a new request with specific ID.
    ///
    /// # Errors
    ///
    /// Propagates rendering errors from [`Command::to_script`].
    pub fn with_id(id: RequestId, command: Command) -> Result<Self> {
        let script = command.to_script()?;
        Ok(Self {
            id,
            command,
            script,
        })
    }

    /// Returns the `module.methodName` of the wrapped command.
    #[inline]
    #[must_use]
    pub const fn method_name(&self) -> &'static str {
        self.command.method_name()
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the script host.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": "uuid", "type": "success", "result": 42 }
/// ```
///
/// Error:
/// ```json
/// { "id": "uuid", "type": "error", "error": "script error", "message": "x is not defined" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Response type.
    #[serde(rename = "type")]
    pub response_type: ResponseType,

    /// Evaluation result (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error code (if error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error message (if error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            response_type: ResponseType::Success,
            result: Some(result),
            error: None,
            message: None,
        }
    }

    /// Creates an error response.
    #[must_use]
    pub fn error(id: RequestId, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            response_type: ResponseType::Error,
            result: None,
            error: Some(error.into()),
            message: Some(message.into()),
        }
    }

    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptError`] if the response was an error.
    pub fn into_result(self) -> Result<Value> {
        match self.response_type {
            ResponseType::Success => Ok(self.result.unwrap_or(Value::Null)),
            ResponseType::Error => {
                let error_code = self.error.unwrap_or_else(|| "unknown error".to_string());
                let message = self.message.unwrap_or(error_code);
                Err(Error::script_error(message))
            }
        }
    }
}

// ============================================================================
// ResponseType
// ============================================================================

/// Response type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Successful evaluation.
    Success,
    /// Failed evaluation.
    Error,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_carries_command_and_script() {
        let request = Request::new(Command::Start).expect("request");
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json["method"], "connection.start");
        assert_eq!(json["script"], "start()");
        assert!(json["id"].is_string());
        assert_eq!(request.method_name(), "connection.start");
    }

    #[test]
    fn test_request_with_id() {
        let id = RequestId::generate();
        let request = Request::with_id(
            id,
            Command::Invoke {
                hub: "chat".to_string(),
                method: "send".to_string(),
                arguments: vec![json!("hi")],
            },
        )
        .expect("request");

        assert_eq!(request.id, id);
        assert_eq!(request.script, "chat.invoke('send', 'hi')");
    }

    #[test]
    fn test_request_rejects_bad_hub() {
        let result = Request::new(Command::EnsureHub {
            hub: "my hub".to_string(),
        });
        assert!(matches!(result, Err(Error::InvalidIdentifier { .. })));
    }

    #[test]
    fn test_request_parses_back() {
        let request = Request::new(Command::SetQueryString {
            value: json!({"token": "t"}),
        })
        .expect("request");
        let text = serde_json::to_string(&request).expect("serialize");
        let parsed: Request = serde_json::from_str(&text).expect("parse");
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_success_response() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "success",
            "result": {"value": 42}
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert!(response.is_success());
        let result = response.into_result().expect("should succeed");
        assert_eq!(result["value"], 42);
    }

    #[test]
    fn test_success_without_result_is_null() {
        let response = Response {
            id: RequestId::generate(),
            response_type: ResponseType::Success,
            result: None,
            error: None,
            message: None,
        };
        assert_eq!(response.into_result().expect("ok"), Value::Null);
    }

    #[test]
    fn test_error_response() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "error",
            "error": "script error",
            "message": "chat is not defined"
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert!(response.is_error());
        let err = response.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Script error: chat is not defined");
    }

    #[test]
    fn test_error_constructor() {
        let id = RequestId::generate();
        let response = Response::error(id, "script error", "boom");
        assert!(response.is_error());
        assert_eq!(response.id, id);
        assert_eq!(response.message.as_deref(), Some("boom"));
    }
}
