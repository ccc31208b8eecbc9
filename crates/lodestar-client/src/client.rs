use std::sync::Arc;
use std::time::Duration;

use lodestar_common::protocol::error::Result;
use lodestar_common::protocol::ServiceInterface;
use tracing::info;

use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::discovery::{HttpServiceDiscovery, ServiceDiscovery};
use crate::load_balancer::LoadBalancer;
use crate::proxy::ServiceProxy;
use crate::transport::CallTransport;

/// Everything a proxy needs to place a call, shared by all proxies of one
/// client.
pub(crate) struct ClientCore {
    pub(crate) discovery: Arc<dyn ServiceDiscovery>,
    pub(crate) load_balancer: Arc<dyn LoadBalancer>,
    pub(crate) transport: CallTransport,
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) request_timeout: Duration,
}

/// Lodestar client for making RPC calls
///
/// Owns one correlator, one load balancer and one discovery source. Every
/// proxy created from the same client shares them, so round-robin advances
/// across all calls of the client regardless of which proxy made them.
///
/// Creates a fresh TCP connection for each call.
///
/// # Example
///
/// ```no_run
/// use lodestar_client::{ClientConfig, RpcClient};
/// use lodestar_common::{ServiceInterface, TypeDescriptor};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RpcClient::new(ClientConfig::default())?;
/// let echo = client.proxy(
///     ServiceInterface::builder("Echo")
///         .method("echo", vec![TypeDescriptor::String], TypeDescriptor::String)
///         .build()?,
/// )?;
/// let reply: String = echo.invoke("echo", vec![json!("hello")]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    core: Arc<ClientCore>,
}

impl RpcClient {
    /// Create a client that discovers instances through the configured
    /// registry.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let discovery = HttpServiceDiscovery::connect(&config.registry_address)?;
        info!(
            "Client using registry {} with {} balancing, timeout {}ms",
            config.registry_address,
            config.load_balance_strategy,
            config.request_timeout.as_millis()
        );

        Ok(Self::with_parts(
            Arc::new(discovery),
            config.load_balance_strategy.build(),
            config.request_timeout,
        ))
    }

    /// Create a client from explicit parts.
    pub fn with_parts(
        discovery: Arc<dyn ServiceDiscovery>,
        load_balancer: Arc<dyn LoadBalancer>,
        request_timeout: Duration,
    ) -> Self {
        let correlator = Correlator::new();
        let transport = CallTransport::new(correlator.clone());

        Self {
            core: Arc::new(ClientCore {
                discovery,
                load_balancer,
                transport,
                correlator,
                request_timeout,
            }),
        }
    }

    /// Creates a stand-in for the service `interface` describes.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if `interface` does not describe a callable
    /// service (no name, no methods, duplicate signatures).
    pub fn proxy(&self, interface: ServiceInterface) -> Result<ServiceProxy> {
        interface.validate()?;
        Ok(ServiceProxy::new(Arc::new(interface), self.core.clone()))
    }

    /// The client's pending-call table.
    pub fn correlator(&self) -> Arc<Correlator> {
        self.core.correlator.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        self.core.request_timeout
    }
}
