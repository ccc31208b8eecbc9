use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use lodestar_common::protocol::error::Result;
use lodestar_common::protocol::RpcRequest;
use lodestar_common::transport::TcpServer;
use lodestar_common::RegistryClient;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::ServerDispatcher;
use crate::registration::RegistrationAgent;

/// Lodestar server: accepts calls over TCP and dispatches them to the
/// exported services.
///
/// Each connection carries one request and one response. Handlers run on the
/// blocking pool, so many calls proceed in parallel.
pub struct RpcServer {
    server: TcpServer,
    dispatcher: Arc<ServerDispatcher>,
    config: ServerConfig,
    agent: Option<RegistrationAgent>,
}

impl RpcServer {
    /// Binds the server to `config.host:config.port`.
    ///
    /// # Arguments
    /// * `config` - Server configuration
    /// * `dispatcher` - The services to export
    ///
    /// # Errors
    /// Returns `Config` if the configuration is invalid, or `Transport` if
    /// the address cannot be bound.
    pub async fn bind(config: ServerConfig, dispatcher: ServerDispatcher) -> Result<Self> {
        config.validate()?;
        let server = TcpServer::new(&config.bind_addr()).await?;
        Ok(Self {
            server,
            dispatcher: Arc::new(dispatcher),
            config,
            agent: None,
        })
    }

    /// Announces the exported services to the configured registry while
    /// running.
    ///
    /// Advertises `config.host` and the port actually bound.
    pub fn with_registration(mut self) -> Result<Self> {
        let registry = RegistryClient::new(&self.config.registry_address)?;
        let port = self.local_addr()?.port();
        self.agent = Some(RegistrationAgent::for_services(
            registry,
            self.dispatcher.service_names(),
            &self.config.host,
            port,
            self.config.registration(),
        )?);
        Ok(self)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn dispatcher(&self) -> &ServerDispatcher {
        &self.dispatcher
    }

    pub fn registration(&self) -> Option<&RegistrationAgent> {
        self.agent.as_ref()
    }

    /// Runs until the process is stopped.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Runs until `shutdown` resolves, then unregisters from the registry.
    pub async fn run_until<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        info!(
            "Serving {} on {}",
            self.dispatcher.service_names().join(", "),
            self.local_addr()?
        );

        let registration_task = self.agent.as_ref().map(|agent| agent.spawn());

        let dispatcher = self.dispatcher.clone();
        let outcome = self
            .server
            .run_until(
                move |request: RpcRequest| {
                    let dispatcher = dispatcher.clone();
                    async move { dispatcher.dispatch(request).await }
                },
                shutdown,
            )
            .await;

        if let Some(task) = registration_task {
            task.abort();
        }
        if let Some(agent) = &self.agent {
            if let Err(e) = agent.shutdown().await {
                warn!("Unregistering on shutdown failed: {}", e);
            }
        }

        info!("Server stopped");
        outcome
    }
}
