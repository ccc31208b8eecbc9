use std::future::Future;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use crate::protocol::error::{LodestarError, Result};
use crate::protocol::{RpcRequest, RpcResponse};
use crate::transport::codec::{JsonCodec, MessageKind, WireMessage};
use crate::transport::tcp::TcpTransportAsync;

/// Error kind sent back when a request frame cannot be decoded
pub const MALFORMED_REQUEST: &str = "MalformedRequest";

/// Async TCP server for service instances.
///
/// Each accepted connection carries exactly one framed request and gets
/// exactly one framed response before it is closed.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:8080")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| LodestarError::Transport(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| LodestarError::Transport(format!("Failed to get local addr: {}", e)))
    }

    /// Runs the server with the given request handler until the task is
    /// dropped.
    ///
    /// # Arguments
    /// * `handler` - Turns each decoded request into its response
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResponse> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Runs the server until `shutdown` resolves.
    ///
    /// Accept failures are logged and do not stop the loop. Connections
    /// already handed to a task finish on their own.
    pub async fn run_until<F, Fut, S>(&self, handler: F, shutdown: S) -> Result<()>
    where
        F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResponse> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    debug!("TCP server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            debug!("Connection established from {}", peer_addr);

            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handler).await {
                    error!("Connection from {} failed: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle a single connection: one request in, one response out.
async fn handle_connection<F, Fut>(mut stream: TcpStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResponse> + Send + 'static,
{
    let payload = TcpTransportAsync::receive_message(&mut stream).await?;

    let request = match JsonCodec::decode_payload(&payload, MessageKind::Request) {
        Ok(WireMessage::Request(request)) => request,
        Ok(WireMessage::Response(_)) => {
            return Err(LodestarError::InvalidRequest("peer sent a response".to_string()));
        }
        Err(e) => {
            // Without a call id the peer could not correlate a reply anyway.
            let call_id = JsonCodec::peek_call_id(&payload).ok_or_else(|| {
                LodestarError::InvalidRequest(format!("undecodable request without call id: {}", e))
            })?;
            warn!("Failed to decode request {}: {}", call_id, e);
            let response = RpcResponse::error(call_id, MALFORMED_REQUEST, e.to_string());
            return send_response(&mut stream, &response).await;
        }
    };

    let response = handler(request).await;
    send_response(&mut stream, &response).await
}

async fn send_response(stream: &mut TcpStream, response: &RpcResponse) -> Result<()> {
    let payload = JsonCodec::encode_response(response)?;
    TcpTransportAsync::send_message(stream, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{generate_call_id, TypeDescriptor};
    use serde_json::json;
    use std::time::Duration;

    async fn spawn_echo_server() -> std::net::SocketAddr {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            server
                .run_with_handler(|request: RpcRequest| async move {
                    RpcResponse::success(request.call_id, json!(request.arguments))
                })
                .await
        });
        addr
    }

    #[tokio::test]
    async fn test_tcp_server_creation() {
        let server = TcpServer::new("127.0.0.1:0").await;
        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_server_local_addr() {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_one_call_per_connection() {
        let addr = spawn_echo_server().await;
        let transport = TcpTransportAsync::new();

        for n in 0..3 {
            let request = RpcRequest::new("Echo", "echo", vec![TypeDescriptor::Int], vec![json!(n)]);
            let response = transport
                .exchange(&request, &addr.to_string(), Duration::from_secs(2))
                .await
                .unwrap();
            assert_eq!(response.call_id, request.call_id);
            assert_eq!(response.result, Some(json!([n])));
        }
    }

    #[tokio::test]
    async fn test_arguments_are_coerced_before_handler() {
        let addr = spawn_echo_server().await;
        let transport = TcpTransportAsync::new();

        let request = RpcRequest::new("Echo", "echo", vec![TypeDescriptor::Int], vec![json!("5")]);
        let response = transport
            .exchange(&request, &addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!([5])));
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_response() {
        let addr = spawn_echo_server().await;
        let transport = TcpTransportAsync::new();
        let call_id = generate_call_id();

        let payload = json!({
            "call_id": call_id.to_string(),
            "service_name": "Echo",
            "method_name": "echo",
            "parameter_signature": ["int"],
            "arguments": ["not a number"]
        })
        .to_string();

        let mut stream = transport.connect(&addr.to_string()).await.unwrap();
        TcpTransportAsync::send_message(&mut stream, payload.as_bytes()).await.unwrap();
        let reply = TcpTransportAsync::receive_message(&mut stream).await.unwrap();
        let response = JsonCodec::decode_response(&reply).unwrap();

        assert_eq!(response.call_id, call_id);
        assert_eq!(response.error.unwrap().kind, MALFORMED_REQUEST);
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let request = RpcRequest::new("Echo", "ping", vec![], vec![]);
        let err = TcpTransportAsync::new()
            .exchange(&request, &addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LodestarError::Transport(_)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            server
                .run_until(
                    |request: RpcRequest| async move { RpcResponse::success(request.call_id, json!(null)) },
                    async {
                        rx.await.ok();
                    },
                )
                .await
        });

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
