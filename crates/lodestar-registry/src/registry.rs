use std::future::Future;
use std::sync::Arc;

use lodestar_common::protocol::error::{LodestarError, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::RegistryConfig;
use crate::http_server::HttpServer;
use crate::membership::MembershipStore;
use crate::sweeper::{ExpirySweeper, SweepConfig};

/// Lodestar Registry - tracks which instances offer which services.
///
/// The registry owns the membership store, runs the expiry sweep in the
/// background and exposes the store through the HTTP endpoints. All
/// consistency is best-effort: an instance that stops heartbeating stays
/// discoverable until the next sweep removes it.
pub struct Registry {
    store: Arc<MembershipStore>,
    config: RegistryConfig,
    /// Background sweep task handle (aborted when the registry is dropped)
    sweeper_handle: tokio::task::JoinHandle<()>,
}

impl Registry {
    /// Creates a registry and starts its expiry sweep.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `Config` if the configuration is invalid, e.g. a zero
    /// heartbeat interval.
    ///
    /// # Example
    /// ```no_run
    /// # use lodestar_registry::{Registry, RegistryConfig};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let registry = Registry::new(RegistryConfig::default())?;
    /// registry.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(MembershipStore::new());
        let sweeper_handle = ExpirySweeper::new(
            store.clone(),
            SweepConfig {
                heartbeat_interval: config.heartbeat_interval,
            },
        )?
        .spawn();

        Ok(Self {
            store,
            config,
            sweeper_handle,
        })
    }

    pub fn store(&self) -> Arc<MembershipStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Binds the configured address and serves until the process stops.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LodestarError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        self.serve(listener, std::future::pending()).await
    }

    /// Serves the HTTP endpoints on `listener` until `shutdown` resolves.
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        info!(
            "Registry up: heartbeat interval {}ms, expiry after {}ms",
            self.config.heartbeat_interval.as_millis(),
            self.config.expiry_threshold().as_millis()
        );

        HttpServer::new(self.store.clone()).serve(listener, shutdown).await
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.sweeper_handle.abort();
    }
}
