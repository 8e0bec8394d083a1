use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::config::Environment;
use crate::response::ResponseEnvelope;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Upstream statuses that are meaningful to a gateway client and are passed
/// through unchanged. Anything else becomes a 500.
const PASS_THROUGH_STATUSES: [u16; 8] = [400, 404, 408, 413, 429, 502, 503, 504];

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Not Found - {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Please try again in {} seconds.", wait_secs(.retry_after_ms))]
    RateLimited { retry_after_ms: u64 },

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("{0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            GatewayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream { status, .. } => {
                if PASS_THROUGH_STATUSES.contains(status) {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            GatewayError::Internal(_) | GatewayError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Value of the envelope's `error` field
    pub fn kind(&self) -> &'static str {
        status_name(self.status())
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            GatewayError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Error envelope; internal details are only exposed in development.
    pub fn to_envelope(&self, environment: Environment) -> ResponseEnvelope {
        let details = environment.is_development().then(|| format!("{:?}", self));
        ResponseEnvelope::failure(self.kind(), self.to_string(), details)
    }

    /// Error response carrying the envelope for `environment`
    pub fn into_response_for(self, environment: Environment) -> Response {
        let mut response = (self.status(), Json(self.to_envelope(environment))).into_response();

        if let Some(retry_after_ms) = self.retry_after_ms() {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs(retry_after_ms).to_string())
            {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.into_response_for(Environment::Production)
    }
}

pub(crate) fn retry_after_secs(retry_after_ms: u64) -> u64 {
    retry_after_ms.div_ceil(1000)
}

fn wait_secs(retry_after_ms: &u64) -> u64 {
    retry_after_secs(*retry_after_ms)
}

fn status_name(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        408 => "RequestTimeout",
        413 => "PayloadTooLarge",
        429 => "TooManyRequests",
        502 => "BadGateway",
        503 => "ServiceUnavailable",
        504 => "GatewayTimeout",
        500 => "InternalServerError",
        _ => "Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::RateLimited { retry_after_ms: 10 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable("down".into()).kind(),
            "ServiceUnavailable"
        );
        assert_eq!(GatewayError::Timeout("slow".into()).kind(), "RequestTimeout");
    }

    #[test]
    fn test_upstream_status_pass_through() {
        let passed = GatewayError::Upstream { status: 429, message: "busy".into() };
        assert_eq!(passed.status(), StatusCode::TOO_MANY_REQUESTS);

        let masked = GatewayError::Upstream { status: 401, message: "bad key".into() };
        assert_eq!(masked.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(masked.kind(), "InternalServerError");
    }

    #[test]
    fn test_rate_limited_message_rounds_up() {
        let err = GatewayError::RateLimited { retry_after_ms: 1_001 };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded. Please try again in 2 seconds."
        );
    }

    #[tokio::test]
    async fn test_response_follows_environment() {
        use http_body_util::BodyExt;

        let response = GatewayError::NotFound("/nope".into())
            .into_response_for(Environment::Development);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "NotFound");
        assert!(json["details"].is_string());

        let response = GatewayError::RateLimited { retry_after_ms: 1_500 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_details_only_in_development() {
        let err = GatewayError::Internal("boom".into());
        assert!(err.to_envelope(Environment::Production).details.is_none());
        assert!(err.to_envelope(Environment::Development).details.is_some());
    }
}
