//! Lodestar Common Types and Transport
//!
//! This crate provides the protocol definitions, wire codec and TCP transport
//! shared by every Lodestar component.
//!
//! # Overview
//!
//! Lodestar is a remote-procedure-call framework. A client calls methods on a
//! local proxy, the call travels to one live instance of the named service,
//! and the result (or the remote failure) travels back. A separate registry
//! tracks which instances are alive. This crate contains what all of those
//! pieces agree on:
//!
//! - **Protocol Layer**: requests, responses, service instances, type
//!   descriptors, service interfaces and the error taxonomy
//! - **Transport Layer**: length-prefixed JSON frames over one TCP connection
//!   per call
//! - **Registry Client**: HTTP access to the registry's membership endpoints
//!
//! # Architecture
//!
//! - **Transport**: TCP, one request and one response per connection
//! - **Serialization**: JSON, field names preserved
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB (prevents memory exhaustion)
//!
//! # Example
//!
//! ```no_run
//! use lodestar_common::{RpcRequest, RpcResponse, TypeDescriptor};
//! use serde_json::json;
//!
//! let request = RpcRequest::new("Calculator", "add", vec![TypeDescriptor::Int; 2], vec![json!(1), json!(2)]);
//! let response = RpcResponse::success(request.call_id, json!(3));
//! ```

pub mod config;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use protocol::*;
pub use registry::RegistryClient;
