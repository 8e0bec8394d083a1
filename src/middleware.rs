use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Environment;
use crate::error::GatewayError;
use crate::metrics::{MetricsCollector, Outcome};
use crate::rate_limiter::UNKNOWN_CLIENT;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id of the current request, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    /// Reuse a caller supplied id when it is printable and reasonably short.
    fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
            .map(|id| RequestId(id.to_string()))
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Assigns or propagates `X-Request-ID` and echoes it on the response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers());
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let started = Instant::now();

    info!(
        target: "ask_gateway::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "ask_gateway::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// State of [`request_timeout_middleware`]
#[derive(Debug, Clone)]
pub struct RequestDeadline {
    pub timeout: Duration,
    pub environment: Environment,
    pub metrics: MetricsCollector,
}

/// Request-wide deadline. On expiry the inner future is dropped, which
/// cancels any in-flight upstream call, and a timeout envelope is returned.
pub async fn request_timeout_middleware(
    State(deadline): State<RequestDeadline>,
    request: Request,
    next: Next,
) -> Response {
    let uri = request.uri().clone();

    match tokio::time::timeout(deadline.timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                target: "ask_gateway::middleware",
                uri = %uri,
                timeout_ms = deadline.timeout.as_millis() as u64,
                "Request exceeded deadline"
            );
            // The dropped handler never reached its own record call.
            deadline.metrics.record(Outcome::TimedOut, 0).await;
            GatewayError::Timeout("Request timeout".to_string())
                .into_response_for(deadline.environment)
        }
    }
}

/// Rate limiting key for a caller. Forwarding headers are only honoured when
/// the gateway sits behind a trusted proxy.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(forwarded) = headers.get("x-forwarded-for") {
            if let Ok(forwarded_str) = forwarded.to_str() {
                if let Some(first_ip) = forwarded_str.split(',').next() {
                    let first_ip = first_ip.trim();
                    if !first_ip.is_empty() {
                        return first_ip.to_string();
                    }
                }
            }
        }

        if let Some(real_ip) = headers.get("x-real-ip") {
            if let Ok(ip_str) = real_ip.to_str() {
                return ip_str.trim().to_string();
            }
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}
