use std::collections::HashMap;

use async_trait::async_trait;
use lodestar_common::protocol::error::Result;
use lodestar_common::protocol::ServiceInstance;
use lodestar_common::RegistryClient;

/// Source of the current instance list for a service.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Current instances of `service`, possibly empty.
    ///
    /// # Errors
    /// Returns `Discovery` when the source cannot be queried.
    async fn discover(&self, service: &str) -> Result<Vec<ServiceInstance>>;
}

/// Asks the registry's `/discover` endpoint on every call.
///
/// No caching: a call always sees the registry's latest answer, including
/// instances that are stale but not yet swept.
#[derive(Debug, Clone)]
pub struct HttpServiceDiscovery {
    registry: RegistryClient,
}

impl HttpServiceDiscovery {
    pub fn new(registry: RegistryClient) -> Self {
        Self { registry }
    }

    /// Discovery against the registry at `address` (`host:port` or URL).
    pub fn connect(address: &str) -> Result<Self> {
        Ok(Self::new(RegistryClient::new(address)?))
    }
}

#[async_trait]
impl ServiceDiscovery for HttpServiceDiscovery {
    async fn discover(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        self.registry.discover(service).await
    }
}

/// A fixed service → instances table.
///
/// For registry-less deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    services: HashMap<String, Vec<ServiceInstance>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(mut self, instance: ServiceInstance) -> Self {
        self.services
            .entry(instance.service_name.clone())
            .or_default()
            .push(instance);
        self
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn discover(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self.services.get(service).cloned().unwrap_or_default())
    }
}
