use std::sync::Arc;
use std::time::Duration;

use lodestar_common::config::require_nonzero;
use lodestar_common::protocol::error::Result;
use tracing::{debug, info, warn};

use crate::membership::MembershipStore;

/// Expiry sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Heartbeat period expected from instances; the sweep runs this often
    /// and expires instances silent for more than twice this long.
    pub heartbeat_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(3000),
        }
    }
}

/// Background task that prunes instances which stopped heartbeating.
///
/// This is the only mechanism that removes dead instances; discovery itself
/// never filters by freshness.
pub struct ExpirySweeper {
    store: Arc<MembershipStore>,
    config: SweepConfig,
}

impl ExpirySweeper {
    /// Creates a new sweeper.
    ///
    /// # Arguments
    /// * `store` - The membership store to prune
    /// * `config` - Sweep configuration
    ///
    /// # Errors
    /// Returns `Config` if the heartbeat interval is zero.
    pub fn new(store: Arc<MembershipStore>, config: SweepConfig) -> Result<Self> {
        require_nonzero("sweep interval", config.heartbeat_interval)?;
        Ok(Self { store, config })
    }

    /// Starts the sweeper task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Main sweep loop
    async fn run(self) {
        info!(
            "Expiry sweep every {}ms, threshold {}ms",
            self.config.heartbeat_interval.as_millis(),
            self.config.heartbeat_interval.as_millis() * 2
        );

        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.sweep_once();
        }
    }

    /// Run a single sweep and log what it removed.
    pub fn sweep_once(&self) -> usize {
        let expired = self.store.sweep(self.config.heartbeat_interval);

        for instance in &expired {
            warn!(
                "Instance {} of {} at {} expired (last heartbeat {})",
                instance.instance_id,
                instance.service_name,
                instance.address(),
                instance.last_heartbeat
            );
        }

        debug!(
            "Sweep done: {} expired, {} instance(s) across {:?}",
            expired.len(),
            self.store.instance_count(),
            self.store.service_names()
        );

        expired.len()
    }
}
