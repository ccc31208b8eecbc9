//! Registration Agent
//!
//! Keeps the registry informed about the services this server exports:
//! registers them at startup (retrying until the registry answers),
//! heartbeats while registered, re-announces periodically so a restarted
//! registry relearns them, and unregisters on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lodestar_common::config::require_nonzero;
use lodestar_common::protocol::error::Result;
use lodestar_common::protocol::ServiceInstance;
use lodestar_common::RegistryClient;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Registration timing.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Period between heartbeats while registered (default: 3000ms)
    pub heartbeat_interval: Duration,
    /// Delay before retrying a failed registration (default: 30000ms)
    pub retry_interval: Duration,
    /// Period of the idempotent re-announce (default: 30000ms)
    pub poll_interval: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(3000),
            retry_interval: Duration::from_millis(30000),
            poll_interval: Duration::from_millis(30000),
        }
    }
}

impl RegistrationConfig {
    /// # Errors
    /// Returns `Config` if any period is zero.
    pub fn validate(&self) -> Result<()> {
        require_nonzero("heartbeat interval", self.heartbeat_interval)?;
        require_nonzero("retry interval", self.retry_interval)?;
        require_nonzero("poll interval", self.poll_interval)?;
        Ok(())
    }
}

struct AgentState {
    registry: RegistryClient,
    instances: Vec<ServiceInstance>,
    config: RegistrationConfig,
    registered: AtomicBool,
    in_flight: AtomicBool,
}

/// Announces a fixed set of service instances to one registry.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RegistrationAgent {
    state: Arc<AgentState>,
}

impl RegistrationAgent {
    /// # Errors
    /// Returns `Config` if the timing is invalid.
    pub fn new(registry: RegistryClient, instances: Vec<ServiceInstance>, config: RegistrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(AgentState {
                registry,
                instances,
                config,
                registered: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
            }),
        })
    }

    /// One instance per service, all advertising `host:port`, each with a
    /// freshly generated instance id.
    pub fn for_services<I, S>(
        registry: RegistryClient,
        services: I,
        host: &str,
        port: u16,
        config: RegistrationConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let instances = services
            .into_iter()
            .map(|service| ServiceInstance::new(service, host, port))
            .collect();
        Self::new(registry, instances, config)
    }

    pub fn instances(&self) -> &[ServiceInstance] {
        &self.state.instances
    }

    pub fn is_registered(&self) -> bool {
        self.state.registered.load(Ordering::Acquire)
    }

    /// Registers every instance.
    ///
    /// Only one attempt runs at a time; a call made while another is in
    /// flight returns immediately.
    ///
    /// # Returns
    /// `true` if this call performed the registration, `false` if another
    /// attempt was already in flight
    ///
    /// # Errors
    /// Returns the registry error of the first instance that failed; the
    /// agent is then marked unregistered.
    pub async fn register_all(&self) -> Result<bool> {
        if self
            .state
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Registration already in flight");
            return Ok(false);
        }

        let outcome = self.announce().await;
        self.state.registered.store(outcome.is_ok(), Ordering::Release);
        self.state.in_flight.store(false, Ordering::Release);
        outcome.map(|_| true)
    }

    async fn announce(&self) -> Result<()> {
        for instance in &self.state.instances {
            self.state.registry.register(instance).await?;
            debug!(
                "Announced {} ({}) at {}",
                instance.service_name,
                instance.instance_id,
                instance.address()
            );
        }
        Ok(())
    }

    /// Heartbeats every instance.
    ///
    /// # Errors
    /// Returns the first failure; the agent is then marked unregistered so
    /// the retry timer registers it again.
    pub async fn heartbeat_all(&self) -> Result<()> {
        for instance in &self.state.instances {
            if let Err(e) = self
                .state
                .registry
                .heartbeat(&instance.service_name, instance.instance_id)
                .await
            {
                self.state.registered.store(false, Ordering::Release);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Starts the registration task.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let agent = self.clone();
        tokio::spawn(async move {
            agent.run().await;
        })
    }

    /// Main registration loop
    async fn run(self) {
        let config = &self.state.config;
        info!(
            "Registering {} service(s) with {}",
            self.state.instances.len(),
            self.state.registry.base_url()
        );

        if let Err(e) = self.register_all().await {
            warn!(
                "Registration failed, retrying in {}ms: {}",
                config.retry_interval.as_millis(),
                e
            );
        }

        let mut heartbeat = ticker(config.heartbeat_interval);
        let mut retry = ticker(config.retry_interval);
        let mut poll = ticker(config.poll_interval);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if self.is_registered() {
                        if let Err(e) = self.heartbeat_all().await {
                            warn!("Heartbeat failed, will re-register: {}", e);
                        }
                    }
                }
                _ = retry.tick() => {
                    if !self.is_registered() {
                        if let Err(e) = self.register_all().await {
                            warn!("Registration retry failed: {}", e);
                        }
                    }
                }
                _ = poll.tick() => {
                    if let Err(e) = self.register_all().await {
                        warn!("Re-announce failed: {}", e);
                    }
                }
            }
        }
    }

    /// Unregisters every instance.
    ///
    /// Attempts all of them even if some fail.
    ///
    /// # Errors
    /// Returns the last failure.
    pub async fn shutdown(&self) -> Result<()> {
        self.state.registered.store(false, Ordering::Release);

        let mut outcome = Ok(());
        for instance in &self.state.instances {
            match self.state.registry.unregister(instance).await {
                Ok(()) => info!("Unregistered {} ({})", instance.service_name, instance.instance_id),
                Err(e) => {
                    warn!("Failed to unregister {}: {}", instance.service_name, e);
                    outcome = Err(e);
                }
            }
        }
        outcome
    }
}

/// An interval whose first tick is one period from now.
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
