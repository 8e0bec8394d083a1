use serde::{Deserialize, Serialize};

/// Where the text of a successful envelope came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Upstream,
    Fallback,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub source: Source,
    pub processing_time_ms: u64,
    pub retry_attempts: u32,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
}

/// The single JSON body every `/ask` call answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl ResponseEnvelope {
    pub fn success(response: String, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            message: None,
            details: None,
            metadata: Some(metadata),
        }
    }

    pub fn failure(error: &str, message: String, details: Option<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.to_string()),
            message: Some(message),
            details,
            metadata: None,
        }
    }
}

/// Outcome of a rate limit check plus the values reported in the
/// `X-RateLimit-*` headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: u64,
    pub retry_after_ms: Option<u64>,
}

impl RateDecision {
    pub fn allowed(limit: u32, remaining: u32, reset_at_ms: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at_ms,
            retry_after_ms: None,
        }
    }

    pub fn rejected(limit: u32, reset_at_ms: u64, retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at_ms,
            retry_after_ms: Some(retry_after_ms),
        }
    }

    /// Reset time in unix seconds, as sent in `X-RateLimit-Reset`
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}
