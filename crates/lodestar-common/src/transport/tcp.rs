use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::protocol::error::{LodestarError, Result};
use crate::protocol::{RpcRequest, RpcResponse};
use crate::transport::codec::{JsonCodec, MessageKind, WireMessage, LENGTH_PREFIX_SIZE};

/// Async TCP transport for Lodestar calls.
///
/// Every call gets its own connection: connect, write one framed request,
/// read one framed response, close. Connections are never pooled or reused.
///
/// # Wire Protocol
///
/// Messages are sent with a 4-byte length prefix (big-endian u32) followed
/// by the JSON-encoded data:
///
/// ```text
/// [4-byte length] [JSON data]
/// ```
///
/// # Example
///
/// ```no_run
/// use lodestar_common::transport::TcpTransportAsync;
/// use lodestar_common::protocol::RpcRequest;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransportAsync::new();
/// let request = RpcRequest::new("Echo", "ping", vec![], vec![]);
/// let response = transport
///     .exchange(&request, "127.0.0.1:8080", Duration::from_secs(5))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransportAsync;

impl TcpTransportAsync {
    /// Creates a new async TCP transport instance.
    pub fn new() -> Self {
        Self
    }

    /// Connects to a remote endpoint.
    ///
    /// Resolves the address (which may yield several socket addresses) and
    /// tries each until one accepts.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address to connect to (e.g., "127.0.0.1:8080")
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the address cannot be resolved or every
    /// resolved address refuses the connection.
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        let socket_addrs = lookup_host(addr)
            .await
            .map_err(|e| LodestarError::Transport(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect(socket_addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    return Ok(stream);
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }

        Err(LodestarError::Transport(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Performs one complete call against `addr`.
    ///
    /// Opens a fresh connection, writes the framed request and reads the
    /// framed response. The whole exchange, connect included, is bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// - `Transport` if connecting, writing or reading fails, or the deadline passes
    /// - `Serialization` if the response frame cannot be decoded
    /// - `InvalidResponse` if the response breaks the result/error invariant
    pub async fn exchange(&self, request: &RpcRequest, addr: &str, timeout: Duration) -> Result<RpcResponse> {
        let exchange = async {
            let mut stream = self.connect(addr).await?;
            debug!("Connected to {} for call {}", addr, request.call_id);
            self.send_request(&mut stream, request).await
        };

        tokio::time::timeout(timeout, exchange).await.map_err(|_| {
            LodestarError::Transport(format!(
                "Exchange with {} did not finish within {}ms",
                addr,
                timeout.as_millis()
            ))
        })?
    }

    /// Sends a request on an open stream and waits for its response.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream to use
    /// * `request` - The request to send
    pub async fn send_request(&self, stream: &mut TcpStream, request: &RpcRequest) -> Result<RpcResponse> {
        let frame = JsonCodec::encode(&WireMessage::Request(request.clone()))?;
        Self::write_frame(stream, &frame).await?;

        let payload = Self::receive_message(stream).await?;
        match JsonCodec::decode_payload(&payload, MessageKind::Response)? {
            WireMessage::Response(response) => Ok(response),
            WireMessage::Request(_) => Err(LodestarError::InvalidResponse(
                "peer answered with a request".to_string(),
            )),
        }
    }

    /// Sends a message with length prefix.
    ///
    /// Wire format: `[4-byte length as u32 big-endian] + [data]`
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream to use
    /// * `data` - The payload to send
    pub async fn send_message(stream: &mut TcpStream, data: &[u8]) -> Result<()> {
        let frame = JsonCodec::frame(data)?;
        Self::write_frame(stream, &frame).await
    }

    async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> Result<()> {
        stream
            .write_all(frame)
            .await
            .map_err(|e| Self::map_io_error(e, "writing frame"))?;

        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Receives a message with length prefix.
    ///
    /// Wire format: `[4-byte length as u32 big-endian] + [data]`
    ///
    /// # Returns
    ///
    /// The payload, without its prefix
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Reading the length prefix fails
    /// - Message exceeds maximum size (100 MB)
    /// - Reading the data fails
    pub async fn receive_message(stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| Self::map_io_error(e, "reading length prefix"))?;

        let len = JsonCodec::payload_len(len_buf)?;

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| Self::map_io_error(e, "reading data"))?;

        Ok(buf)
    }

    /// Map IO errors to transport errors, keeping the step that failed.
    fn map_io_error(err: std::io::Error, context: &str) -> LodestarError {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                LodestarError::Transport(format!("{}: connection closed by peer", context))
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected => {
                LodestarError::Transport(format!("{}: connection lost", context))
            }
            _ => LodestarError::Transport(format!("{}: {}", context, err)),
        }
    }
}
