use std::net::SocketAddr;
use std::time::Duration;

use lodestar_common::config::{env_millis_or, env_or, require_nonzero};
use lodestar_common::protocol::error::{LodestarError, Result};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Interface the HTTP endpoints bind to
    pub host: String,
    /// Port the HTTP endpoints listen on
    ///
    /// Default: 2181
    pub port: u16,
    /// Expected heartbeat period of registered instances
    ///
    /// The expiry sweep runs at this period and removes instances silent for
    /// more than twice this long.
    /// Default: 3000ms
    pub heartbeat_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2181,
            heartbeat_interval: Duration::from_millis(3000),
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `LODESTAR_REGISTRY_HOST`,
    /// `LODESTAR_REGISTRY_PORT` and `LODESTAR_REGISTRY_HEARTBEAT_INTERVAL_MS`.
    ///
    /// # Errors
    /// Returns `Config` if a variable does not parse or the heartbeat
    /// interval is zero.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            host: env_or("LODESTAR_REGISTRY_HOST", defaults.host)?,
            port: env_or("LODESTAR_REGISTRY_PORT", defaults.port)?,
            heartbeat_interval: env_millis_or(
                "LODESTAR_REGISTRY_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the values a running registry depends on.
    ///
    /// # Errors
    /// Returns `Config` if the heartbeat interval is zero, since the expiry
    /// sweep cannot run at that period.
    pub fn validate(&self) -> Result<()> {
        require_nonzero("registry heartbeat interval", self.heartbeat_interval)?;
        Ok(())
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Silence longer than this gets an instance swept.
    pub fn expiry_threshold(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| LodestarError::Config(format!("Invalid registry bind address: {}", e)))
    }
}
