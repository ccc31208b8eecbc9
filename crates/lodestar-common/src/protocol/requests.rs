use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::TypeDescriptor;

pub type CallId = Uuid;
pub type MethodName = String;
pub type RpcArgs = Vec<serde_json::Value>;

/// A single invocation of a remote method.
///
/// Immutable once sent. The call id correlates the eventual response with
/// the caller waiting for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub call_id: CallId,
    pub service_name: String,
    pub method_name: MethodName,
    pub parameter_signature: Vec<TypeDescriptor>,
    pub arguments: RpcArgs,
}

impl RpcRequest {
    /// Creates a request with a freshly generated call id.
    pub fn new(
        service_name: impl Into<String>,
        method_name: impl Into<MethodName>,
        parameter_signature: Vec<TypeDescriptor>,
        arguments: RpcArgs,
    ) -> Self {
        RpcRequest {
            call_id: generate_call_id(),
            service_name: service_name.into(),
            method_name: method_name.into(),
            parameter_signature,
            arguments,
        }
    }

    /// Replaces the generated call id.
    pub fn with_call_id(mut self, call_id: CallId) -> Self {
        self.call_id = call_id;
        self
    }
}

/// Random v4 ids are unique across processes, not just within one.
pub fn generate_call_id() -> CallId {
    Uuid::new_v4()
}
