use std::time::Duration;

use lodestar_common::config::{env_millis_or, env_or};
use lodestar_common::protocol::error::Result;

use crate::load_balancer::LoadBalanceStrategy;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Registry to discover instances from (`host:port` or URL)
    ///
    /// Default: "localhost:2181"
    pub registry_address: String,
    /// How long a call may wait for its response
    ///
    /// Default: 5000ms
    pub request_timeout: Duration,
    /// How to choose among live instances
    ///
    /// Default: round-robin
    pub load_balance_strategy: LoadBalanceStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            registry_address: "localhost:2181".to_string(),
            request_timeout: Duration::from_millis(5000),
            load_balance_strategy: LoadBalanceStrategy::RoundRobin,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `LODESTAR_REGISTRY_ADDRESS`,
    /// `LODESTAR_REQUEST_TIMEOUT_MS` and `LODESTAR_LOAD_BALANCE_STRATEGY`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            registry_address: env_or("LODESTAR_REGISTRY_ADDRESS", defaults.registry_address)?,
            request_timeout: env_millis_or("LODESTAR_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            load_balance_strategy: env_or("LODESTAR_LOAD_BALANCE_STRATEGY", defaults.load_balance_strategy)?,
        })
    }

    pub fn with_registry_address(mut self, address: impl Into<String>) -> Self {
        self.registry_address = address.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_load_balance_strategy(mut self, strategy: LoadBalanceStrategy) -> Self {
        self.load_balance_strategy = strategy;
        self
    }
}
