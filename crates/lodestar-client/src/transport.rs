use std::sync::Arc;
use std::time::Duration;

use lodestar_common::protocol::error::LodestarError;
use lodestar_common::protocol::RpcRequest;
use lodestar_common::transport::TcpTransportAsync;
use tracing::debug;

use crate::correlator::Correlator;

/// How long an exchange may outlive its caller's deadline.
///
/// A response that lands inside this window reaches the correlator and is
/// discarded there instead of being cut off mid-read.
pub const LATE_RESPONSE_GRACE: Duration = Duration::from_secs(1);

/// Sends calls and resolves them through the correlator.
///
/// Each call runs on its own task with its own connection. Whatever the
/// exchange produces (a response, a connect failure, a broken stream) is
/// handed to the correlator, never to the caller directly.
#[derive(Clone)]
pub struct CallTransport {
    tcp: TcpTransportAsync,
    correlator: Arc<Correlator>,
}

impl CallTransport {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self {
            tcp: TcpTransportAsync::new(),
            correlator,
        }
    }

    /// Sends `request` to `host:port`.
    ///
    /// The call must already be registered with the correlator. The
    /// exchange is bounded by `timeout` plus [`LATE_RESPONSE_GRACE`], so
    /// the spawned task always ends.
    pub fn call(&self, request: RpcRequest, host: &str, port: u16, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let tcp = self.tcp;
        let correlator = self.correlator.clone();
        let addr = format!("{}:{}", host, port);

        tokio::spawn(async move {
            let call_id = request.call_id;
            let outcome = tcp.exchange(&request, &addr, timeout + LATE_RESPONSE_GRACE).await;

            match outcome {
                Ok(response) if response.call_id == call_id => {
                    correlator.complete(call_id, response);
                }
                Ok(response) => {
                    correlator.fail(
                        call_id,
                        LodestarError::InvalidResponse(format!(
                            "expected response to {}, got {}",
                            call_id, response.call_id
                        )),
                    );
                }
                Err(e) => {
                    debug!("Call {} to {} failed: {}", call_id, addr, e);
                    correlator.fail(call_id, e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_common::protocol::{generate_call_id, RpcResponse};
    use lodestar_common::transport::TcpServer;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_resolves_through_correlator() {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            server
                .run_with_handler(|request: RpcRequest| async move {
                    RpcResponse::success(request.call_id, json!("pong"))
                })
                .await
        });

        let correlator = Correlator::new();
        let transport = CallTransport::new(correlator.clone());
        let request = RpcRequest::new("Echo", "ping", vec![], vec![]);
        let mut handle = correlator
            .register(request.call_id, "Echo", "ping", Duration::from_secs(2))
            .unwrap();

        transport.call(request, "127.0.0.1", addr.port(), Duration::from_secs(2));
        let response = handle.wait_for(Duration::from_secs(2)).await.unwrap().unwrap();
        assert_eq!(response.result, Some(json!("pong")));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_resolves_immediately() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let correlator = Correlator::new();
        let transport = CallTransport::new(correlator.clone());
        let request = RpcRequest::new("Echo", "ping", vec![], vec![]);
        let mut handle = correlator
            .register(request.call_id, "Echo", "ping", Duration::from_secs(30))
            .unwrap();

        transport.call(request, "127.0.0.1", port, Duration::from_secs(30));
        let outcome = handle.wait_for(Duration::from_secs(2)).await.unwrap();
        assert!(matches!(outcome, Err(LodestarError::Transport(_))));
    }

    #[tokio::test]
    async fn test_mismatched_call_id_fails_call() {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            server
                .run_with_handler(|_request: RpcRequest| async move {
                    RpcResponse::success(generate_call_id(), json!(1))
                })
                .await
        });

        let correlator = Correlator::new();
        let transport = CallTransport::new(correlator.clone());
        let request = RpcRequest::new("Echo", "ping", vec![], vec![]);
        let mut handle = correlator
            .register(request.call_id, "Echo", "ping", Duration::from_secs(2))
            .unwrap();

        transport.call(request, "127.0.0.1", addr.port(), Duration::from_secs(2));
        let outcome = handle.wait_for(Duration::from_secs(2)).await.unwrap();
        assert!(matches!(outcome, Err(LodestarError::InvalidResponse(_))));
    }
}
