//! Request pipeline for `/ask`
//!
//! A request moves through `Received -> Validated -> RateChecked ->
//! Forwarding(attempt) -> Completed | Degraded | Rejected` and produces
//! exactly one [`GatewayReply`].

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::time::Instant;
use tracing::info;

use crate::auth::ApiKeyAuth;
use crate::config::Environment;
use crate::error::{retry_after_secs, GatewayError};
use crate::fallback::FallbackGenerator;
use crate::metrics::{MetricsCollector, Outcome};
use crate::rate_limiter::RateLimiter;
use crate::response::{RateDecision, ResponseEnvelope, ResponseMetadata, Source};
use crate::upstream::{ForwardFailure, UpstreamClient, UpstreamError};
use crate::validation::RequestValidator;

/// Everything the pipeline needs from one inbound call
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_id: String,
    pub client_id: String,
    /// Raw `Authorization` or `X-API-Key` value
    pub credential: Option<String>,
    /// Parsed JSON body
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub status: StatusCode,
    pub envelope: ResponseEnvelope,
    pub rate: Option<RateDecision>,
}

impl IntoResponse for GatewayReply {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();

        if let Some(rate) = &self.rate {
            insert_header(&mut headers, "x-ratelimit-limit", rate.limit);
            insert_header(&mut headers, "x-ratelimit-remaining", rate.remaining);
            insert_header(&mut headers, "x-ratelimit-reset", rate.reset_at_secs());
            if let Some(retry_after_ms) = rate.retry_after_ms {
                insert_header(&mut headers, "retry-after", retry_after_secs(retry_after_ms));
            }
        }

        (self.status, headers, Json(self.envelope)).into_response()
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}

pub struct Gateway {
    environment: Environment,
    auth: ApiKeyAuth,
    limiter: RateLimiter,
    upstream: UpstreamClient,
    fallback: FallbackGenerator,
    metrics: MetricsCollector,
}

impl Gateway {
    pub fn new(
        environment: Environment,
        auth: ApiKeyAuth,
        limiter: RateLimiter,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            environment,
            auth,
            limiter,
            upstream,
            fallback: FallbackGenerator::new(environment),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub async fn handle(&self, request: InboundRequest) -> GatewayReply {
        let started = Instant::now();
        let request_id = request.request_id.as_str();

        if let Err(e) = self.auth.authorize(request.credential.as_deref()) {
            info!(request_id = %request_id, "Rejected: invalid or missing API key");
            return self.reject(e, None).await;
        }

        let raw_query = request.body.as_ref().and_then(|body| body.get("query"));
        let query = match RequestValidator::validate_query(raw_query) {
            Ok(query) => query,
            Err(e) => {
                info!(request_id = %request_id, error = %e, "Rejected: invalid query");
                return self.reject(e, None).await;
            }
        };

        let decision = self.limiter.admit_now(&request.client_id).await;
        if let Some(retry_after_ms) = decision.retry_after_ms {
            info!(
                request_id = %request_id,
                client_id = %request.client_id,
                retry_after_ms,
                "Rejected: rate limited"
            );
            return self
                .reject(GatewayError::RateLimited { retry_after_ms }, Some(decision))
                .await;
        }

        match self.upstream.forward(&query, request_id).await {
            Ok(forwarded) => {
                let metadata = ResponseMetadata {
                    source: Source::Upstream,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    retry_attempts: forwarded.retry_attempts,
                    request_id: request_id.to_string(),
                    model: forwarded.completion.model,
                    tokens: forwarded.completion.usage,
                };
                self.metrics
                    .record(Outcome::Completed, forwarded.retry_attempts)
                    .await;
                info!(request_id = %request_id, "Completed from upstream");

                GatewayReply {
                    status: StatusCode::OK,
                    envelope: ResponseEnvelope::success(forwarded.completion.text, metadata),
                    rate: Some(decision),
                }
            }
            Err(failure) => self.degrade(&query, request_id, started, failure, decision).await,
        }
    }

    /// Error reply for failures detected before the pipeline runs, such as an
    /// unparseable body.
    pub async fn error_reply(&self, error: GatewayError) -> GatewayReply {
        self.reject(error, None).await
    }

    async fn degrade(
        &self,
        query: &str,
        request_id: &str,
        started: Instant,
        failure: ForwardFailure,
        decision: RateDecision,
    ) -> GatewayReply {
        let attempts = failure.retry_attempts + 1;

        match self.fallback.generate(query, attempts) {
            Ok(text) => {
                let metadata = ResponseMetadata {
                    source: Source::Fallback,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    retry_attempts: failure.retry_attempts,
                    request_id: request_id.to_string(),
                    model: None,
                    tokens: None,
                };
                self.metrics
                    .record(Outcome::Degraded, failure.retry_attempts)
                    .await;
                info!(
                    request_id = %request_id,
                    error = %failure.error,
                    "Upstream failed, answered with fallback"
                );

                GatewayReply {
                    status: StatusCode::OK,
                    envelope: ResponseEnvelope::success(text, metadata),
                    rate: Some(decision),
                }
            }
            Err(unavailable) => {
                let error = match failure.error {
                    UpstreamError::Status { status, message } => {
                        GatewayError::Upstream { status, message }
                    }
                    UpstreamError::InvalidResponse(message) => GatewayError::Internal(message),
                    UpstreamError::Timeout { .. } | UpstreamError::Unavailable(_) => unavailable,
                };
                self.metrics
                    .record(Outcome::Failed, failure.retry_attempts)
                    .await;
                info!(request_id = %request_id, error = %error, "Upstream failure surfaced");

                GatewayReply {
                    status: error.status(),
                    envelope: error.to_envelope(self.environment),
                    rate: Some(decision),
                }
            }
        }
    }

    async fn reject(&self, error: GatewayError, rate: Option<RateDecision>) -> GatewayReply {
        self.metrics.record(Outcome::Rejected, 0).await;

        GatewayReply {
            status: error.status(),
            envelope: error.to_envelope(self.environment),
            rate,
        }
    }
}
