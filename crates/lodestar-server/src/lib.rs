//! Lodestar Server
//!
//! Exports services over the Lodestar wire protocol. A [`ServiceDefinition`]
//! declares the methods, the [`ServerDispatcher`] routes requests to them, and
//! the [`RpcServer`] serves the dispatcher over TCP while a
//! [`RegistrationAgent`] keeps the registry informed.

pub mod config;
pub mod dispatcher;
pub mod registration;
pub mod server;
pub mod service;

pub use config::ServerConfig;
pub use dispatcher::{ServerDispatcher, INVOCATION_PANICKED, METHOD_NOT_FOUND, SERVICE_NOT_FOUND};
pub use registration::{RegistrationAgent, RegistrationConfig};
pub use server::RpcServer;
pub use service::{MethodHandler, ServiceDefinition, ServiceError, ServiceResult, INVALID_ARGUMENT};
