//! Lodestar Transport Layer
//!
//! This module provides the wire codec and the TCP transport used for every
//! call between a client and a service instance.
//!
//! # Architecture
//!
//! - **Codec**: JSON payloads, field names preserved
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Connections**: one per call, closed after the response
//!
//! # Components
//!
//! - **[`Codec`]** / **[`JsonCodec`]**: Frame and unframe protocol messages
//! - **[`TcpTransportAsync`]**: Client side of a single call
//! - **[`TcpServer`]**: Accept loop for service instances
//!
//! # Message Size Limits
//!
//! Frames larger than 100 MB are rejected on both sides to prevent memory
//! exhaustion.

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::{Codec, JsonCodec, MessageKind, WireMessage, MAX_MESSAGE_SIZE};
pub use tcp::TcpTransportAsync;
pub use tcp_server::{TcpServer, MALFORMED_REQUEST};
