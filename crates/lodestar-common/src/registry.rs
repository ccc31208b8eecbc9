//! HTTP client for the registry's membership endpoints.
//!
//! Shared by the client side (discovery) and the server side (registration
//! and heartbeats), so both talk to the registry the same way.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::protocol::error::{LodestarError, Result};
use crate::protocol::{Heartbeat, InstanceId, ServiceInstance};

/// Default per-request timeout against the registry
const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Creates a client for the registry at `address`.
    ///
    /// # Arguments
    /// * `address` - `host:port`, or a full `http://` / `https://` URL
    ///
    /// # Errors
    /// Returns `Config` if the HTTP client cannot be built.
    pub fn new(address: &str) -> Result<Self> {
        Self::with_timeout(address, DEFAULT_REGISTRY_TIMEOUT)
    }

    pub fn with_timeout(address: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LodestarError::Config(format!("Failed to build registry client: {}", e)))?;

        Ok(Self {
            base_url: normalize_base_url(address),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the current instances of `service`.
    ///
    /// # Errors
    /// Returns `Discovery` if the registry is unreachable, answers with a
    /// non-success status, or sends a body that is not an instance list.
    pub async fn discover(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        let url = format!("{}/discover", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("service", service)])
            .send()
            .await
            .map_err(|e| LodestarError::Discovery(format!("Registry unreachable at {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LodestarError::Discovery(format!(
                "Registry answered {} to discover {}",
                status, service
            )));
        }

        let instances: Vec<ServiceInstance> = response
            .json()
            .await
            .map_err(|e| LodestarError::Discovery(format!("Malformed discovery answer for {}: {}", service, e)))?;

        debug!("Discovered {} instance(s) of {}", instances.len(), service);
        Ok(instances)
    }

    /// Registers (or re-announces) an instance.
    pub async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        self.post("register", instance).await
    }

    /// Refreshes the liveness of a registered instance.
    pub async fn heartbeat(&self, service_name: &str, instance_id: InstanceId) -> Result<()> {
        let body = Heartbeat {
            service_name: service_name.to_string(),
            instance_id,
        };
        self.post("heartbeat", &body).await
    }

    /// Removes an instance from the registry.
    pub async fn unregister(&self, instance: &ServiceInstance) -> Result<()> {
        self.post("unregister", instance).await
    }

    async fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LodestarError::Registry(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LodestarError::Registry(format!(
                "POST {} answered {}: {}",
                url, status, text
            )));
        }

        Ok(())
    }
}

fn normalize_base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
