use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lodestar_common::protocol::error::{LodestarError, Result};
use lodestar_common::protocol::ServiceInstance;
use rand::Rng;

/// Picks one instance among several equally valid candidates.
///
/// Implementations are pure selection policies: they never filter the list
/// and never hand back nothing. An empty list is an `InvalidState` error.
pub trait LoadBalancer: Send + Sync {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance>;

    /// Strategy name, as accepted by [`LoadBalanceStrategy::from_str`].
    fn name(&self) -> &'static str;
}

fn no_candidates() -> LodestarError {
    LodestarError::InvalidState("no available service instances".to_string())
}

/// Uniform random pick using the thread-local generator.
#[derive(Debug, Default)]
pub struct RandomLoadBalancer;

impl RandomLoadBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance> {
        if instances.is_empty() {
            return Err(no_candidates());
        }
        let index = rand::thread_rng().gen_range(0..instances.len());
        Ok(&instances[index])
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Round-robin over whatever list it is handed.
///
/// A single shared counter advances on every selection; the index is the
/// counter modulo the list length. The counter wraps and is never reset.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    counter: AtomicUsize,
}

impl RoundRobinLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance> {
        if instances.is_empty() {
            return Err(no_candidates());
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        Ok(&instances[index])
    }

    fn name(&self) -> &'static str {
        "roundRobin"
    }
}

/// Load-balancing strategy selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalanceStrategy {
    Random,
    #[default]
    RoundRobin,
}

impl LoadBalanceStrategy {
    /// Creates a fresh balancer for this strategy.
    pub fn build(self) -> Arc<dyn LoadBalancer> {
        match self {
            LoadBalanceStrategy::Random => Arc::new(RandomLoadBalancer::new()),
            LoadBalanceStrategy::RoundRobin => Arc::new(RoundRobinLoadBalancer::new()),
        }
    }
}

impl FromStr for LoadBalanceStrategy {
    type Err = LodestarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(LoadBalanceStrategy::Random),
            "roundrobin" | "round_robin" | "round-robin" => Ok(LoadBalanceStrategy::RoundRobin),
            other => Err(LodestarError::Config(format!(
                "unknown load balance strategy '{}' (expected random or roundRobin)",
                other
            ))),
        }
    }
}

impl fmt::Display for LoadBalanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalanceStrategy::Random => write!(f, "random"),
            LoadBalanceStrategy::RoundRobin => write!(f, "roundRobin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn instances(count: u16) -> Vec<ServiceInstance> {
        (0..count)
            .map(|i| ServiceInstance::new("Echo", "localhost", 9001 + i))
            .collect()
    }

    #[test]
    fn test_round_robin() {
        let list = instances(3);
        let lb = RoundRobinLoadBalancer::new();

        assert_eq!(lb.select(&list).unwrap().port, 9001);
        assert_eq!(lb.select(&list).unwrap().port, 9002);
        assert_eq!(lb.select(&list).unwrap().port, 9003);
        assert_eq!(lb.select(&list).unwrap().port, 9001);
    }

    #[test]
    fn test_round_robin_fairness() {
        let lb = RoundRobinLoadBalancer::new();

        for len in 1..=7u16 {
            let list = instances(len);
            for n in [0usize, 1, 5, 13, 100] {
                let mut counts: HashMap<u16, usize> = HashMap::new();
                for _ in 0..n {
                    *counts.entry(lb.select(&list).unwrap().port).or_default() += 1;
                }

                let floor = n / len as usize;
                let ceil = (n + len as usize - 1) / len as usize;
                for instance in &list {
                    let seen = counts.get(&instance.port).copied().unwrap_or(0);
                    assert!(
                        seen == floor || seen == ceil,
                        "len {} n {}: port {} chosen {} times",
                        len, n, instance.port, seen
                    );
                }
            }
        }
    }

    #[test]
    fn test_round_robin_cycles_before_repeating() {
        let list = instances(4);
        let lb = RoundRobinLoadBalancer::new();
        lb.select(&list).unwrap();

        let window: Vec<u16> = (0..4).map(|_| lb.select(&list).unwrap().port).collect();
        let mut sorted = window.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4, "window {:?} repeated an instance", window);
    }

    #[test]
    fn test_round_robin_counter_wraps() {
        let list = instances(3);
        let lb = RoundRobinLoadBalancer {
            counter: AtomicUsize::new(usize::MAX),
        };

        assert_eq!(lb.select(&list).unwrap().port, 9001 + (usize::MAX % 3) as u16);
        assert_eq!(lb.select(&list).unwrap().port, 9001);
    }

    #[test]
    fn test_empty_list_is_invalid_state() {
        let empty: Vec<ServiceInstance> = vec![];
        assert!(matches!(
            RoundRobinLoadBalancer::new().select(&empty),
            Err(LodestarError::InvalidState(_))
        ));
        assert!(matches!(
            RandomLoadBalancer::new().select(&empty),
            Err(LodestarError::InvalidState(_))
        ));
    }

    #[test]
    fn test_single_instance() {
        let list = instances(1);
        let lb = RandomLoadBalancer::new();
        for _ in 0..10 {
            assert_eq!(lb.select(&list).unwrap().port, 9001);
        }
    }

    #[test]
    fn test_random_stays_in_bounds_and_spreads() {
        let list = instances(5);
        let lb = RandomLoadBalancer::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(lb.select(&list).unwrap().port);
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_concurrent_round_robin_is_fair() {
        use std::thread;

        let list = Arc::new(instances(4));
        let lb = Arc::new(RoundRobinLoadBalancer::new());
        let counts = Arc::new(std::sync::Mutex::new(HashMap::<u16, usize>::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (list, lb, counts) = (list.clone(), lb.clone(), counts.clone());
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let port = lb.select(&list).unwrap().port;
                        *counts.lock().unwrap().entry(port).or_default() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for (_, count) in counts.lock().unwrap().iter() {
            assert_eq!(*count, 2000);
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("random".parse::<LoadBalanceStrategy>().unwrap(), LoadBalanceStrategy::Random);
        assert_eq!("roundRobin".parse::<LoadBalanceStrategy>().unwrap(), LoadBalanceStrategy::RoundRobin);
        assert_eq!("round_robin".parse::<LoadBalanceStrategy>().unwrap(), LoadBalanceStrategy::RoundRobin);
        assert_eq!("ROUND-ROBIN".parse::<LoadBalanceStrategy>().unwrap(), LoadBalanceStrategy::RoundRobin);
        assert!("weighted".parse::<LoadBalanceStrategy>().is_err());
        assert_eq!(LoadBalanceStrategy::default(), LoadBalanceStrategy::RoundRobin);
    }

    #[test]
    fn test_strategy_builds_matching_balancer() {
        assert_eq!(LoadBalanceStrategy::Random.build().name(), "random");
        assert_eq!(LoadBalanceStrategy::RoundRobin.build().name(), "roundRobin");
        assert_eq!(LoadBalanceStrategy::RoundRobin.to_string(), "roundRobin");
    }
}
