use std::time::Duration;

use lodestar_common::config::{env_millis_or, env_or};
use lodestar_common::protocol::error::Result;

use crate::registration::RegistrationConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host the server binds to and advertises to the registry
    ///
    /// Default: "localhost"
    pub host: String,
    /// RPC port; 0 picks a free one and advertises whatever was bound
    ///
    /// Default: 8080
    pub port: u16,
    /// Registry to announce the exported services to
    ///
    /// Default: "localhost:2181"
    pub registry_address: String,
    /// Default: 3000ms
    pub heartbeat_interval: Duration,
    /// Delay between failed registration attempts
    ///
    /// Default: 30000ms
    pub retry_interval: Duration,
    /// Period of the full re-announce
    ///
    /// Default: 30000ms
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            registry_address: "localhost:2181".to_string(),
            heartbeat_interval: Duration::from_millis(3000),
            retry_interval: Duration::from_millis(30000),
            poll_interval: Duration::from_millis(30000),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `LODESTAR_SERVER_HOST`, `LODESTAR_SERVER_PORT`,
    /// `LODESTAR_REGISTRY_ADDRESS`, `LODESTAR_HEARTBEAT_INTERVAL_MS`,
    /// `LODESTAR_RETRY_INTERVAL_MS` and `LODESTAR_POLL_INTERVAL_MS`.
    ///
    /// # Errors
    /// Returns `Config` if a variable does not parse or an interval is zero.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            host: env_or("LODESTAR_SERVER_HOST", defaults.host)?,
            port: env_or("LODESTAR_SERVER_PORT", defaults.port)?,
            registry_address: env_or("LODESTAR_REGISTRY_ADDRESS", defaults.registry_address)?,
            heartbeat_interval: env_millis_or("LODESTAR_HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval)?,
            retry_interval: env_millis_or("LODESTAR_RETRY_INTERVAL_MS", defaults.retry_interval)?,
            poll_interval: env_millis_or("LODESTAR_POLL_INTERVAL_MS", defaults.poll_interval)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `Config` if the heartbeat, retry or poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        self.registration().validate()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_registry_address(mut self, address: impl Into<String>) -> Self {
        self.registry_address = address.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn registration(&self) -> RegistrationConfig {
        RegistrationConfig {
            heartbeat_interval: self.heartbeat_interval,
            retry_interval: self.retry_interval,
            poll_interval: self.poll_interval,
        }
    }
}
