use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lodestar_common::protocol::error::{LodestarError, Result};
use lodestar_common::protocol::{coerce_arguments, RpcRequest, ServiceInterface};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ClientCore;

/// Local stand-in for a remote service.
///
/// Every call is routed through discovery, load balancing and the
/// correlator. Equality, hashing and formatting are answered locally and
/// never reach the network.
#[derive(Clone)]
pub struct ServiceProxy {
    interface: Arc<ServiceInterface>,
    core: Arc<ClientCore>,
}

impl ServiceProxy {
    pub(crate) fn new(interface: Arc<ServiceInterface>, core: Arc<ClientCore>) -> Self {
        Self { interface, core }
    }

    pub fn service_name(&self) -> &str {
        &self.interface.name
    }

    pub fn interface(&self) -> &ServiceInterface {
        &self.interface
    }

    /// Invoke a remote method and decode its result.
    ///
    /// # Arguments
    /// * `method` - Method name declared by the interface
    /// * `args` - Positional arguments
    ///
    /// # Returns
    /// The remote result converted to `R`
    ///
    /// # Errors
    /// * `InvalidRequest` - the interface has no such method for this arity
    /// * `Discovery` - the registry could not be queried
    /// * `NoInstances` - no live instance of the service
    /// * `RpcTimeout` - no response within the request timeout
    /// * `Transport` - the connection failed
    /// * `Serialization` - the result does not fit the declared return type
    /// * `RemoteInvocation` - the server reported an error
    pub async fn invoke<R: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<R> {
        let value = self.invoke_value(method, args).await?;
        serde_json::from_value(value).map_err(|e| {
            LodestarError::Serialization(format!(
                "cannot decode result of {}.{}: {}",
                self.interface.name, method, e
            ))
        })
    }

    /// Invoke a remote method and return its result as JSON, coerced to the
    /// declared return type.
    ///
    /// Failures that do not already name the call are prefixed with
    /// `service.method`.
    pub async fn invoke_value(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.call(method, args)
            .await
            .map_err(|e| with_call_context(e, &self.interface.name, method))
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let service = self.interface.name.as_str();
        let signature = self.interface.resolve(method, args.len())?;

        let instances = self.core.discovery.discover(service).await?;
        if instances.is_empty() {
            return Err(LodestarError::NoInstances(service.to_string()));
        }
        let instance = self.core.load_balancer.select(&instances)?;

        let arguments = coerce_arguments(&signature.parameters, args)?;
        let request = RpcRequest::new(service, method, signature.parameters.clone(), arguments);
        let call_id = request.call_id;
        let timeout = self.core.request_timeout;

        debug!(
            "Calling {}.{} on {} as {}",
            service,
            method,
            instance.address(),
            call_id
        );

        let mut handle = self.core.correlator.register(call_id, service, method, timeout)?;
        self.core
            .transport
            .call(request, &instance.host, instance.port, timeout);

        let outcome = match handle.wait_for(timeout).await {
            Some(outcome) => outcome,
            None => match self.core.correlator.expire(call_id) {
                Some(timeout_error) => {
                    warn!("Call {}.{} ({}) timed out", service, method, call_id);
                    return Err(timeout_error);
                }
                // resolved between the deadline and the expiry
                None => handle.try_take().unwrap_or_else(|| {
                    Err(LodestarError::InvalidState(format!(
                        "call {} resolved without an outcome",
                        call_id
                    )))
                }),
            },
        };

        let response = outcome?;
        response.validate()?;

        if let Some(error) = response.error {
            return Err(LodestarError::RemoteInvocation {
                service: service.to_string(),
                method: method.to_string(),
                kind: error.kind,
                message: error.message,
            });
        }

        signature.returns.coerce(response.result.unwrap_or(Value::Null))
    }
}

/// Names the failed call in errors that carry only a message.
fn with_call_context(error: LodestarError, service: &str, method: &str) -> LodestarError {
    let prefixed = |message: String| format!("{}.{}: {}", service, method, message);
    match error {
        LodestarError::Transport(m) => LodestarError::Transport(prefixed(m)),
        LodestarError::Io(e) => LodestarError::Transport(prefixed(e.to_string())),
        LodestarError::InvalidResponse(m) => LodestarError::InvalidResponse(prefixed(m)),
        LodestarError::Serialization(m) => LodestarError::Serialization(prefixed(m)),
        LodestarError::Discovery(m) => LodestarError::Discovery(prefixed(m)),
        LodestarError::InvalidState(m) => LodestarError::InvalidState(prefixed(m)),
        other => other,
    }
}

impl PartialEq for ServiceProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core) && self.interface.name == other.interface.name
    }
}

impl Eq for ServiceProxy {}

impl Hash for ServiceProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.interface.name.hash(state);
    }
}

impl fmt::Display for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceProxy[{}]", self.interface.name)
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("service", &self.interface.name)
            .field("methods", &self.interface.methods.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticDiscovery;
    use crate::load_balancer::RoundRobinLoadBalancer;
    use crate::RpcClient;
    use lodestar_common::protocol::{RpcResponse, ServiceInstance, TypeDescriptor};
    use lodestar_common::transport::TcpServer;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    fn echo_interface() -> ServiceInterface {
        ServiceInterface::builder("Echo")
            .method("echo", vec![TypeDescriptor::String], TypeDescriptor::String)
            .method("add", vec![TypeDescriptor::Int, TypeDescriptor::Int], TypeDescriptor::Int)
            .build()
            .unwrap()
    }

    fn client_with(discovery: StaticDiscovery, timeout: Duration) -> RpcClient {
        RpcClient::with_parts(
            Arc::new(discovery),
            Arc::new(RoundRobinLoadBalancer::new()),
            timeout,
        )
    }

    async fn spawn_server<F, Fut>(handler: F) -> u16
    where
        F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = RpcResponse> + Send + 'static,
    {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move { server.run_with_handler(handler).await });
        port
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let port = spawn_server(|request: RpcRequest| async move {
            let a = request.arguments[0].as_i64().unwrap();
            let b = request.arguments[1].as_i64().unwrap();
            RpcResponse::success(request.call_id, json!(a + b))
        })
        .await;

        let client = client_with(
            StaticDiscovery::new().with_instance(ServiceInstance::new("Echo", "127.0.0.1", port)),
            Duration::from_secs(2),
        );
        let proxy = client.proxy(echo_interface()).unwrap();

        // "3" is coerced to an int before it leaves
        let sum: i64 = proxy.invoke("add", vec![json!(2), json!("3")]).await.unwrap();
        assert_eq!(sum, 5);
        assert_eq!(client.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_message() {
        let port = spawn_server(|request: RpcRequest| async move {
            RpcResponse::error(request.call_id, "IllegalArgument", "bad input")
        })
        .await;

        let client = client_with(
            StaticDiscovery::new().with_instance(ServiceInstance::new("Echo", "127.0.0.1", port)),
            Duration::from_secs(2),
        );
        let proxy = client.proxy(echo_interface()).unwrap();

        let err = proxy.invoke::<String>("echo", vec![json!("x")]).await.unwrap_err();
        assert_eq!(err.to_string(), "bad input");
        match err {
            LodestarError::RemoteInvocation { kind, .. } => assert_eq!(kind, "IllegalArgument"),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(client.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_no_instances() {
        let client = client_with(StaticDiscovery::new(), Duration::from_secs(1));
        let proxy = client.proxy(echo_interface()).unwrap();

        let err = proxy.invoke::<String>("echo", vec![json!("x")]).await.unwrap_err();
        assert!(matches!(err, LodestarError::NoInstances(ref s) if s == "Echo"));
        assert_eq!(client.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_method_fails_locally() {
        let client = client_with(StaticDiscovery::new(), Duration::from_secs(1));
        let proxy = client.proxy(echo_interface()).unwrap();

        let err = proxy.invoke::<Value>("shout", vec![json!("x")]).await.unwrap_err();
        assert!(matches!(err, LodestarError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let port = spawn_server(|request: RpcRequest| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            RpcResponse::success(request.call_id, json!("late"))
        })
        .await;

        let client = client_with(
            StaticDiscovery::new().with_instance(ServiceInstance::new("Echo", "127.0.0.1", port)),
            Duration::from_millis(50),
        );
        let proxy = client.proxy(echo_interface()).unwrap();

        let err = proxy.invoke::<String>("echo", vec![json!("x")]).await.unwrap_err();
        assert!(matches!(err, LodestarError::RpcTimeout { timeout_ms: 50, .. }));
        assert_eq!(client.correlator().pending_count(), 0);

        // the late response is dropped, not delivered
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.correlator().discarded_count(), 1);
        assert_eq!(client.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_names_the_call() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client_with(
            StaticDiscovery::new().with_instance(ServiceInstance::new("Echo", "127.0.0.1", port)),
            Duration::from_secs(2),
        );
        let proxy = client.proxy(echo_interface()).unwrap();

        let err = proxy.invoke::<String>("echo", vec![json!("x")]).await.unwrap_err();
        assert!(matches!(err, LodestarError::Transport(_)), "got {:?}", err);
        assert!(err.to_string().contains("Echo.echo"), "{}", err);
        assert_eq!(client.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_result_names_the_call() {
        let port = spawn_server(|request: RpcRequest| async move {
            RpcResponse::success(request.call_id, json!("not a number"))
        })
        .await;

        let client = client_with(
            StaticDiscovery::new().with_instance(ServiceInstance::new("Echo", "127.0.0.1", port)),
            Duration::from_secs(2),
        );
        let proxy = client.proxy(echo_interface()).unwrap();

        let err = proxy.invoke_value("add", vec![json!(1), json!(2)]).await.unwrap_err();
        assert!(matches!(err, LodestarError::Serialization(_)), "got {:?}", err);
        assert!(err.to_string().contains("Echo.add"), "{}", err);
    }

    #[test]
    fn test_call_context_is_added_once() {
        let err = with_call_context(LodestarError::Discovery("registry down".into()), "Echo", "echo");
        assert_eq!(err.to_string(), "Discovery error: Echo.echo: registry down");

        let timeout = LodestarError::RpcTimeout {
            service: "Echo".into(),
            method: "echo".into(),
            timeout_ms: 50,
        };
        assert_eq!(
            with_call_context(timeout, "Echo", "echo").to_string(),
            "RPC call Echo.echo timed out after 50ms"
        );
    }

    #[test]
    fn test_identity_is_local() {
        let client = client_with(StaticDiscovery::new(), Duration::from_secs(1));
        let a = client.proxy(echo_interface()).unwrap();
        let b = client.proxy(echo_interface()).unwrap();
        let other = client_with(StaticDiscovery::new(), Duration::from_secs(1))
            .proxy(echo_interface())
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_eq!(a.to_string(), "ServiceProxy[Echo]");

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
    }
}
