pub mod config;
pub mod http_server;
pub mod membership;
pub mod registry;
pub mod sweeper;

pub use config::RegistryConfig;
pub use http_server::HttpServer;
pub use membership::MembershipStore;
pub use registry::Registry;
pub use sweeper::{ExpirySweeper, SweepConfig};
