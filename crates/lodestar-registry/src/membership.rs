//! Registry Membership Store
//!
//! The registry's authoritative table of service name → instance id →
//! instance. Every registration, heartbeat, unregistration, discovery answer
//! and expiry sweep goes through here.
//!
//! # Liveness Model
//!
//! ```text
//! UNREGISTERED --register--> REGISTERED --heartbeat--> REGISTERED
//!                                 |
//!                                 +--sweep (silent > 2x interval)--> REMOVED
//!                                 +--unregister--------------------> REMOVED
//! ```
//!
//! Discovery never filters by freshness. An instance that stopped
//! heartbeating stays visible until the next sweep removes it.
//!
//! # Concurrency
//!
//! The table is a [`DashMap`] keyed by service name, so operations on
//! different services never contend and a sweep only ever holds one shard
//! at a time. Each service's instances change under that service's entry
//! lock, so no reader observes a half-applied update.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use lodestar_common::protocol::{now_millis, InstanceId, ServiceInstance};
use tracing::debug;

#[derive(Debug, Default)]
pub struct MembershipStore {
    services: DashMap<String, HashMap<InstanceId, ServiceInstance>>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance, stamping it with the current time.
    ///
    /// Re-registering an id that is already present refreshes the entry in
    /// place instead of adding a second one.
    ///
    /// # Returns
    /// The stored snapshot
    pub fn register(&self, instance: ServiceInstance) -> ServiceInstance {
        self.register_at(instance, now_millis())
    }

    /// [`register`](Self::register) with an explicit clock reading.
    ///
    /// An instance id lives under one service at a time: registering it
    /// under a new service name drops it from the old one.
    pub fn register_at(&self, mut instance: ServiceInstance, now_ms: u64) -> ServiceInstance {
        self.evict_from_other_services(&instance);

        let mut entry = self.services.entry(instance.service_name.clone()).or_default();

        let previous = entry.get(&instance.instance_id).map(|i| i.last_heartbeat).unwrap_or(0);
        instance.last_heartbeat = previous.max(now_ms);
        entry.insert(instance.instance_id, instance.clone());

        debug!(
            "Registered {} instance {} at {}",
            instance.service_name,
            instance.instance_id,
            instance.address()
        );
        instance
    }

    fn evict_from_other_services(&self, instance: &ServiceInstance) {
        let previous: Vec<String> = self
            .services
            .iter()
            .filter(|entry| entry.key() != &instance.service_name && entry.contains_key(&instance.instance_id))
            .map(|entry| entry.key().clone())
            .collect();

        for service_name in previous {
            if let Some(mut instances) = self.services.get_mut(&service_name) {
                instances.remove(&instance.instance_id);
            }
            self.services.remove_if(&service_name, |_, instances| instances.is_empty());
            debug!(
                "Instance {} moved from {} to {}",
                instance.instance_id, service_name, instance.service_name
            );
        }
    }

    /// Refreshes an instance's heartbeat.
    ///
    /// # Returns
    /// `true` if the instance was known. Unknown instances are ignored: the
    /// sender may simply have lost a race with the sweep.
    pub fn heartbeat(&self, service_name: &str, instance_id: InstanceId) -> bool {
        self.heartbeat_at(service_name, instance_id, now_millis())
    }

    /// [`heartbeat`](Self::heartbeat) with an explicit clock reading.
    pub fn heartbeat_at(&self, service_name: &str, instance_id: InstanceId, now_ms: u64) -> bool {
        let Some(mut entry) = self.services.get_mut(service_name) else {
            return false;
        };

        match entry.get_mut(&instance_id) {
            Some(instance) => {
                // Never move backwards, even if heartbeats are reordered.
                instance.last_heartbeat = instance.last_heartbeat.max(now_ms);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every current instance of `service_name`.
    ///
    /// Ordered by address so repeated discoveries of an unchanged service
    /// list instances identically.
    pub fn discover(&self, service_name: &str) -> Vec<ServiceInstance> {
        let mut instances: Vec<ServiceInstance> = self
            .services
            .get(service_name)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default();

        instances.sort_by(|a, b| {
            (&a.host, a.port, a.instance_id).cmp(&(&b.host, b.port, b.instance_id))
        });
        instances
    }

    /// Removes an instance.
    ///
    /// # Returns
    /// `true` if it was present
    pub fn unregister(&self, service_name: &str, instance_id: InstanceId) -> bool {
        let removed = match self.services.get_mut(service_name) {
            Some(mut entry) => entry.remove(&instance_id).is_some(),
            None => false,
        };

        if removed {
            self.services.remove_if(service_name, |_, instances| instances.is_empty());
            debug!("Unregistered {} instance {}", service_name, instance_id);
        }
        removed
    }

    /// Removes every instance silent for more than `2 × heartbeat_interval`.
    ///
    /// # Returns
    /// The removed instances
    pub fn sweep(&self, heartbeat_interval: Duration) -> Vec<ServiceInstance> {
        self.sweep_at(now_millis(), heartbeat_interval.as_millis() as u64 * 2)
    }

    /// Removes every instance with `now_ms - last_heartbeat > threshold_ms`.
    pub fn sweep_at(&self, now_ms: u64, threshold_ms: u64) -> Vec<ServiceInstance> {
        let mut expired = Vec::new();

        for mut entry in self.services.iter_mut() {
            entry.retain(|_, instance| {
                let silent_for = now_ms.saturating_sub(instance.last_heartbeat);
                if silent_for > threshold_ms {
                    expired.push(instance.clone());
                    false
                } else {
                    true
                }
            });
        }

        self.services.retain(|_, instances| !instances.is_empty());
        expired
    }

    /// Names of every service with at least one instance.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Total number of registered instances across all services.
    pub fn instance_count(&self) -> usize {
        self.services.iter().map(|entry| entry.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL_MS: u64 = 1000;
    const THRESHOLD_MS: u64 = 2 * INTERVAL_MS;

    fn echo(host: &str, port: u16) -> ServiceInstance {
        ServiceInstance::new("Echo", host, port)
    }

    #[test]
    fn test_register_then_discover() {
        let store = MembershipStore::new();
        let a = store.register_at(echo("h1", 9001), 10_000);

        let found = store.discover("Echo");
        assert_eq!(found, vec![a.clone()]);
        assert_eq!(found[0].last_heartbeat, 10_000);
        assert!(store.discover("Other").is_empty());
    }

    #[test]
    fn test_reregistration_is_idempotent() {
        let store = MembershipStore::new();
        let a = echo("h1", 9001);

        store.register_at(a.clone(), 1_000);
        store.register_at(a.clone(), 2_000);
        store.register_at(a.clone(), 3_000);

        let found = store.discover("Echo");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_id, a.instance_id);
        assert_eq!(found[0].last_heartbeat, 3_000);
    }

    #[test]
    fn test_reregistration_under_new_service_moves_instance() {
        let store = MembershipStore::new();
        let a = echo("h1", 9001);
        let b = echo("h2", 9002);
        store.register_at(a.clone(), 1_000);
        store.register_at(b.clone(), 1_000);

        let moved = ServiceInstance::new("Clock", "h1", 9001).with_instance_id(a.instance_id);
        store.register_at(moved, 2_000);

        let echo_left = store.discover("Echo");
        assert_eq!(echo_left.len(), 1);
        assert_eq!(echo_left[0].instance_id, b.instance_id);
        assert_eq!(store.discover("Clock")[0].instance_id, a.instance_id);
        assert_eq!(store.instance_count(), 2);

        // moving the last instance out drops the old service
        let moved_b = ServiceInstance::new("Clock", "h2", 9002).with_instance_id(b.instance_id);
        store.register_at(moved_b, 3_000);
        assert_eq!(store.service_names(), vec!["Clock".to_string()]);
        assert_eq!(store.instance_count(), 2);
    }

    #[test]
    fn test_heartbeat_refreshes_and_never_regresses() {
        let store = MembershipStore::new();
        let a = store.register_at(echo("h1", 9001), 1_000);

        assert!(store.heartbeat_at("Echo", a.instance_id, 5_000));
        assert!(store.heartbeat_at("Echo", a.instance_id, 4_000));
        assert_eq!(store.discover("Echo")[0].last_heartbeat, 5_000);
    }

    #[test]
    fn test_heartbeat_for_unknown_instance_is_ignored() {
        let store = MembershipStore::new();
        assert!(!store.heartbeat_at("Echo", InstanceId::new_v4(), 1_000));

        let a = store.register_at(echo("h1", 9001), 1_000);
        assert!(!store.heartbeat_at("Echo", InstanceId::new_v4(), 2_000));
        assert!(!store.heartbeat_at("Other", a.instance_id, 2_000));
        assert_eq!(store.instance_count(), 1);
    }

    #[test]
    fn test_unregister() {
        let store = MembershipStore::new();
        let a = store.register_at(echo("h1", 9001), 1_000);
        let b = store.register_at(echo("h2", 9002), 1_000);

        assert!(store.unregister("Echo", a.instance_id));
        assert!(!store.unregister("Echo", a.instance_id));
        assert_eq!(store.discover("Echo"), vec![b.clone()]);

        assert!(store.unregister("Echo", b.instance_id));
        assert!(store.service_names().is_empty());
    }

    #[test]
    fn test_sweep_uses_strict_threshold() {
        let store = MembershipStore::new();
        let a = store.register_at(echo("h1", 9001), 0);

        // Exactly at the threshold survives.
        assert!(store.sweep_at(THRESHOLD_MS, THRESHOLD_MS).is_empty());
        assert_eq!(store.discover("Echo").len(), 1);

        let expired = store.sweep_at(THRESHOLD_MS + 1, THRESHOLD_MS);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].instance_id, a.instance_id);
        assert!(store.discover("Echo").is_empty());
        assert!(store.service_names().is_empty());
    }

    #[test]
    fn test_heartbeating_instance_survives_sweeps() {
        let store = MembershipStore::new();
        let a = store.register_at(echo("h1", 9001), 0);
        let b = store.register_at(echo("h2", 9002), 0);

        let mut now = 0;
        for _ in 0..5 {
            now += INTERVAL_MS;
            store.heartbeat_at("Echo", a.instance_id, now);
            store.sweep_at(now, THRESHOLD_MS);
        }

        assert_eq!(store.discover("Echo"), vec![ServiceInstance { last_heartbeat: now, ..a }]);
        assert!(store.discover("Echo").iter().all(|i| i.instance_id != b.instance_id));
    }

    #[test]
    fn test_discovery_does_not_filter_stale_instances() {
        let store = MembershipStore::new();
        store.register_at(echo("h1", 9001), 0);
        // Long silent, but not yet swept.
        assert_eq!(store.discover("Echo").len(), 1);
    }

    #[test]
    fn test_discover_order_is_stable() {
        let store = MembershipStore::new();
        store.register_at(echo("h2", 9002), 0);
        store.register_at(echo("h1", 9001), 0);
        store.register_at(echo("h1", 9000), 0);

        let ports: Vec<u16> = store.discover("Echo").iter().map(|i| i.port).collect();
        assert_eq!(ports, vec![9000, 9001, 9002]);
    }

    #[test]
    fn test_services_are_independent() {
        let store = MembershipStore::new();
        store.register_at(ServiceInstance::new("A", "h", 1), 0);
        store.register_at(ServiceInstance::new("B", "h", 2), 5_000);

        let expired = store.sweep_at(5_000, THRESHOLD_MS);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].service_name, "A");
        assert_eq!(store.service_names(), vec!["B".to_string()]);
    }

    #[test]
    fn test_concurrent_registration_and_sweep() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MembershipStore::new());
        let mut handles = vec![];

        for t in 0..4u16 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100u16 {
                    store.register_at(ServiceInstance::new("Echo", format!("h{}", t), i), 10_000);
                }
            }));
        }
        let sweeper = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    store.sweep_at(10_000, THRESHOLD_MS);
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        sweeper.join().unwrap();

        assert_eq!(store.instance_count(), 400);
    }
}
