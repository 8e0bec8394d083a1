use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::{Gateway, GatewayReply, InboundRequest};
use crate::health::HealthChecker;
use crate::middleware::{client_id, RequestId};

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub gateway: Gateway,
    pub health: HealthChecker,
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn new(gateway: Gateway, config: &Config) -> Self {
        Self {
            gateway,
            health: HealthChecker::new(config),
            trust_proxy_headers: config.trust_proxy_headers,
        }
    }
}

/// Submit a programming query (`POST /ask`, `POST /process`)
pub async fn ask(
    State(state): State<SharedState>,
    request_id: Option<Extension<RequestId>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> GatewayReply {
    let request_id = request_id
        .map(|Extension(id)| id)
        .unwrap_or_default();

    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return state
                .gateway
                .error_reply(GatewayError::InvalidInput(format!(
                    "Invalid JSON body: {}",
                    rejection.body_text()
                )))
                .await;
        }
    };

    let credential = headers
        .get("authorization")
        .or_else(|| headers.get("x-api-key"))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let inbound = InboundRequest {
        request_id: request_id.0,
        client_id: client_id(
            &headers,
            peer.map(|ConnectInfo(addr)| addr),
            state.trust_proxy_headers,
        ),
        credential,
        body: Some(body),
    };

    state.gateway.handle(inbound).await
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.health.check_health(state.gateway.limiter().backend()))
}

/// Endpoint listing
pub async fn docs() -> impl IntoResponse {
    Json(json!({
        "name": "Ask Gateway",
        "description": "Relays programming questions to an LLM backend",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            { "path": "/health", "method": "GET", "description": "Check service health" },
            { "path": "/docs", "method": "GET", "description": "API documentation" },
            { "path": "/metrics", "method": "GET", "description": "Request counters" },
            { "path": "/ask", "method": "POST", "description": "Submit programming queries" },
            { "path": "/process", "method": "POST", "description": "Alias of /ask" }
        ]
    }))
}

/// Request counters and number of tracked rate limit windows
pub async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    let snapshot = state.gateway.metrics().snapshot().await;
    let tracked_clients = state.gateway.limiter().tracked_clients().await;

    Json(json!({
        "requests": snapshot,
        "rateLimit": {
            "trackedClients": tracked_clients,
            "backend": state.gateway.limiter().backend(),
        }
    }))
}

pub async fn not_found(State(state): State<SharedState>, uri: Uri) -> Response {
    GatewayError::NotFound(uri.path().to_string()).into_response_for(state.gateway.environment())
}
