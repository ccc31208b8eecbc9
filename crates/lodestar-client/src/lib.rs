//! Lodestar Client
//!
//! Turns a [`ServiceInterface`](lodestar_common::ServiceInterface) into a
//! [`ServiceProxy`] whose calls are discovered, balanced, sent over TCP and
//! correlated back to the caller.

pub mod client;
pub mod config;
pub mod correlator;
pub mod discovery;
pub mod load_balancer;
pub mod proxy;
pub mod transport;

pub use client::RpcClient;
pub use config::ClientConfig;
pub use correlator::{Correlator, PendingHandle};
pub use discovery::{HttpServiceDiscovery, ServiceDiscovery, StaticDiscovery};
pub use load_balancer::{LoadBalanceStrategy, LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer};
pub use proxy::ServiceProxy;
pub use transport::{CallTransport, LATE_RESPONSE_GRACE};
