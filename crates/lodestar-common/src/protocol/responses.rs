//! Lodestar Response Types
//!
//! This module defines the RPC response envelope.

use serde::{Deserialize, Deserializer, Serialize};

use super::error::{LodestarError, Result};
use super::CallId;

/// RPC method result (JSON value)
///
/// The result is returned as a JSON value and can contain any JSON-serializable data.
pub type RpcResult = serde_json::Value;

/// A structured failure carried inside a response.
///
/// `kind` names the failure category (`ServiceNotFound`, `MethodNotFound`,
/// or whatever the remote method reported), `message` is the human-readable
/// text the remote side produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// An RPC response returned from a service instance to the client.
///
/// # Response Flow
///
/// 1. The instance receives and dispatches an `RpcRequest`
/// 2. The dispatcher builds an `RpcResponse` (result or error)
/// 3. The response is framed and written back on the same connection
/// 4. The client correlates it with the waiting call by `call_id`
///
/// # Fields
///
/// - `call_id`: The id of the request this response answers
/// - `result`: The result value (present on success, may be `null`)
/// - `error`: Structured failure (present when the call failed)
///
/// Exactly one of `result` and `error` is present. A method that returns
/// nothing still produces a present `null` result, which is distinct from
/// an absent one and survives the round trip.
///
/// # Example
///
/// ```
/// use lodestar_common::protocol::{generate_call_id, RpcResponse};
/// use serde_json::json;
///
/// let id = generate_call_id();
/// let success = RpcResponse::success(id, json!({"pi": 3.14159}));
/// let failure = RpcResponse::error(id, "ArithmeticError", "Division by zero");
/// assert!(success.is_success());
/// assert!(!failure.is_success());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    /// Call identifier this response corresponds to
    pub call_id: CallId,
    /// Result value (present on success)
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<RpcResult>,
    /// Failure description (present on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl RpcResponse {
    /// Creates a successful response.
    ///
    /// # Arguments
    ///
    /// * `call_id` - The request identifier (must match the request's id)
    /// * `result` - The result value (any JSON-serializable data, including `null`)
    pub fn success(call_id: CallId, result: RpcResult) -> Self {
        RpcResponse {
            call_id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    ///
    /// # Arguments
    ///
    /// * `call_id` - The request identifier (must match the request's id)
    /// * `kind` - The failure category
    /// * `message` - The failure message, forwarded verbatim to the caller
    pub fn error(call_id: CallId, kind: impl Into<String>, message: impl Into<String>) -> Self {
        RpcResponse {
            call_id,
            result: None,
            error: Some(RemoteError::new(kind, message)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Checks the exactly-one-of invariant between `result` and `error`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` when both or neither are present.
    pub fn validate(&self) -> Result<()> {
        match (&self.result, &self.error) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err(LodestarError::InvalidResponse(format!(
                "response {} carries neither result nor error",
                self.call_id
            ))),
            (Some(_), Some(_)) => Err(LodestarError::InvalidResponse(format!(
                "response {} carries both result and error",
                self.call_id
            ))),
        }
    }
}

// A present `null` must stay `Some(Null)`; only a missing field is `None`.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<RpcResult>, D::Error>
where
    D: Deserializer<'de>,
{
    RpcResult::deserialize(deserializer).map(Some)
}
