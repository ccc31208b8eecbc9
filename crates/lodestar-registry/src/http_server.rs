//! HTTP Server for the Registry
//!
//! This module exposes the membership store over HTTP using axum.
//!
//! # Endpoints
//!
//! | Method | Path | Body / Query | Success |
//! |---|---|---|---|
//! | POST | `/register` | `ServiceInstance` | `{"status":"registered"}` |
//! | GET | `/discover` | `?service=<name>` | JSON array of instances |
//! | POST | `/heartbeat` | `{serviceName, instanceId}` | `{"status":"heartbeat received"}` |
//! | POST | `/unregister` | `ServiceInstance` | `{"status":"unregistered"}` |
//!
//! Malformed bodies and missing parameters answer 400, anything else 404.
//! A panicking handler answers 500 and leaves the store untouched for
//! every other instance.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lodestar_common::protocol::error::{LodestarError, Result};
use lodestar_common::protocol::{InstanceId, ServiceInstance};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::membership::MembershipStore;

/// HTTP server for the registry.
///
/// This server:
/// - Accepts registrations, heartbeats and unregistrations
/// - Answers discovery queries from the membership store
/// - Maps every unknown path or method to 404
pub struct HttpServer {
    store: Arc<MembershipStore>,
}

impl HttpServer {
    /// Creates a new HTTP server over `store`.
    pub fn new(store: Arc<MembershipStore>) -> Self {
        Self { store }
    }

    /// Builds the axum router with every registry endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/register", post(handle_register).fallback(not_found))
            .route("/discover", get(handle_discover).fallback(not_found))
            .route("/heartbeat", post(handle_heartbeat).fallback(not_found))
            .route("/unregister", post(handle_unregister).fallback(not_found))
            .fallback(not_found)
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TraceLayer::new_for_http())
            .with_state(self.store.clone())
    }

    /// Binds `addr` and serves until the process stops.
    ///
    /// # Returns
    /// - `Ok(())` - Server ran successfully
    /// - `Err(LodestarError)` - Server failed to bind or run
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LodestarError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        self.serve(listener, std::future::pending()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        info!(
            "Registry HTTP server listening on {}",
            listener
                .local_addr()
                .map_err(|e| LodestarError::Transport(format!("Failed to get local addr: {}", e)))?
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| LodestarError::Transport(format!("Server error: {}", e)))?;

        Ok(())
    }
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(message: impl Into<String>) -> ApiError {
    let message = message.into();
    warn!("Rejected registry request: {}", message);
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> std::result::Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("Malformed body: {}", e)))
}

/// Handles `POST /register`.
async fn handle_register(
    State(store): State<Arc<MembershipStore>>,
    body: Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    let instance: ServiceInstance = parse_body(&body)?;

    if instance.service_name.trim().is_empty() {
        return Err(bad_request("serviceName must not be empty"));
    }
    if instance.host.trim().is_empty() {
        return Err(bad_request("host must not be empty"));
    }

    let stored = store.register(instance);
    info!(
        "Registered {} instance {} at {}",
        stored.service_name,
        stored.instance_id,
        stored.address()
    );

    Ok(Json(json!({ "status": "registered" })))
}

/// Handles `GET /discover?service=<name>`.
async fn handle_discover(
    State(store): State<Arc<MembershipStore>>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Json<Vec<ServiceInstance>>, ApiError> {
    let service = params
        .get("service")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("Missing 'service' query parameter"))?;

    Ok(Json(store.discover(service)))
}

/// Handles `POST /heartbeat`.
///
/// Heartbeats for instances the store does not know are accepted and
/// ignored; the sender may have raced an expiry sweep.
async fn handle_heartbeat(
    State(store): State<Arc<MembershipStore>>,
    body: Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    let value: Value = parse_body(&body)?;

    let service_name = value
        .get("serviceName")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("Missing field: serviceName"))?;
    let instance_id: InstanceId = value
        .get("instanceId")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request("Missing field: instanceId"))?
        .parse()
        .map_err(|e| bad_request(format!("Invalid instanceId: {}", e)))?;

    if !store.heartbeat(service_name, instance_id) {
        warn!("Heartbeat for unknown {} instance {} ignored", service_name, instance_id);
    }

    Ok(Json(json!({ "status": "heartbeat received" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceRef {
    service_name: String,
    instance_id: Option<InstanceId>,
}

/// Handles `POST /unregister`.
async fn handle_unregister(
    State(store): State<Arc<MembershipStore>>,
    body: Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    let target: InstanceRef = parse_body(&body)?;

    let removed = target
        .instance_id
        .map(|id| store.unregister(&target.service_name, id))
        .unwrap_or(false);

    if removed {
        info!("Unregistered {} instance {:?}", target.service_name, target.instance_id);
    }

    Ok(Json(json!({ "status": "unregistered" })))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "404 Not Found" })))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());

    tracing::error!("Registry handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal registry error" })),
    )
        .into_response()
}
