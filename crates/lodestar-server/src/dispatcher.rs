use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use lodestar_common::protocol::{RpcRequest, RpcResponse, ServiceInterface};
use tracing::{debug, error, warn};

use crate::service::ServiceDefinition;

/// Kind reported when the requested service is not exported here.
pub const SERVICE_NOT_FOUND: &str = "ServiceNotFound";
/// Kind reported when the service has no method with the requested signature.
pub const METHOD_NOT_FOUND: &str = "MethodNotFound";
/// Kind reported when a handler panicked.
pub const INVOCATION_PANICKED: &str = "InvocationPanicked";

/// Routes requests to the exported services.
///
/// The service table is fixed once the dispatcher is built, so it is shared
/// between connections without locking.
#[derive(Default)]
pub struct ServerDispatcher {
    services: HashMap<String, Arc<ServiceDefinition>>,
}

impl ServerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports a service, replacing any earlier service of the same name.
    pub fn with_service(mut self, service: ServiceDefinition) -> Self {
        self.register(service);
        self
    }

    pub fn register(&mut self, service: ServiceDefinition) {
        let name = service.name().to_string();
        if self.services.insert(name.clone(), Arc::new(service)).is_some() {
            warn!("Service {} exported twice, keeping the last definition", name);
        }
    }

    /// Names of the exported services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn interfaces(&self) -> Vec<ServiceInterface> {
        self.services.values().map(|s| s.interface()).collect()
    }

    /// Handles a single request.
    ///
    /// Never fails: every outcome, including a missing service or a
    /// panicking handler, becomes a response carrying the request's call id.
    /// Handlers run on the blocking pool so slow methods do not stall the
    /// connection tasks.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let call_id = request.call_id;

        let Some(service) = self.services.get(&request.service_name) else {
            warn!("Request {} for unknown service {}", call_id, request.service_name);
            return RpcResponse::error(
                call_id,
                SERVICE_NOT_FOUND,
                format!("service {} is not exported by this server", request.service_name),
            );
        };

        let Some(handler) = service.handler(&request.method_name, &request.parameter_signature) else {
            warn!(
                "Request {} for unknown method {}.{}",
                call_id, request.service_name, request.method_name
            );
            return RpcResponse::error(
                call_id,
                METHOD_NOT_FOUND,
                format!(
                    "{}.{}({}) is not defined",
                    request.service_name,
                    request.method_name,
                    request
                        .parameter_signature
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
        };

        debug!(
            "Invoking {}.{} for {}",
            request.service_name, request.method_name, call_id
        );

        let arguments = request.arguments;
        match tokio::task::spawn_blocking(move || handler(arguments)).await {
            Ok(Ok(result)) => RpcResponse::success(call_id, result),
            Ok(Err(e)) => {
                debug!("{}.{} failed: {}", request.service_name, request.method_name, e);
                RpcResponse::error(call_id, e.kind, e.message)
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "invocation was cancelled".to_string()
                };
                error!(
                    "{}.{} panicked: {}",
                    request.service_name, request.method_name, message
                );
                RpcResponse::error(call_id, INVOCATION_PANICKED, message)
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
