//! Client for the upstream chat-completions backend
//!
//! [`UpstreamClient::forward`] runs the liveness probe and the completion
//! request through a [`Transport`], retrying timeouts on the schedule kept in
//! [`RetryState`]. [`HttpTransport`] speaks the OpenAI-style
//! `/chat/completions` protocol used by DeepSeek.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::response::TokenUsage;
use crate::retry::{RetryConfig, RetryState};

const SYSTEM_PROMPT: &str = "You are an expert software architect and developer. \
Your task is to analyze programming requests and provide detailed, structured responses with:
1. Software Architecture - Break down the technical approach into components, patterns, and technologies
2. Best Practices - Outline coding standards, security considerations, and optimization tips
3. Implementation Strategy - Provide a clear step-by-step approach to building the solution
4. Cursor-Optimized Prompts - Provide specific prompts that can be used with AI coding assistants

Your responses should be well-organized, include code examples where appropriate, and focus on practical, maintainable solutions.";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpstreamError {
    #[error("Upstream request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout { .. })
    }
}

/// Generated text plus whatever metrics the backend reported
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone)]
pub struct Forwarded {
    pub completion: Completion,
    pub retry_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct ForwardFailure {
    pub error: UpstreamError,
    pub retry_attempts: u32,
}

pub type UpstreamResult = Result<Forwarded, ForwardFailure>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Cheap liveness check run before every completion attempt
    async fn probe(&self, correlation_id: &str) -> Result<(), UpstreamError>;

    async fn complete(
        &self,
        query: &str,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<Completion, UpstreamError>;
}

#[derive(Clone)]
pub struct UpstreamClient {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
}

impl UpstreamClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    pub async fn forward(&self, query: &str, correlation_id: &str) -> UpstreamResult {
        let mut state = RetryState::new(self.retry);

        loop {
            let attempt = state.attempt();
            let timeout = state.timeout();

            info!(
                request_id = %correlation_id,
                attempt,
                max_attempts = state.max_attempts(),
                timeout_ms = timeout.as_millis() as u64,
                "Forwarding query upstream"
            );

            let result = match self.transport.probe(correlation_id).await {
                Ok(()) => self.transport.complete(query, correlation_id, timeout).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(completion) => {
                    info!(
                        request_id = %correlation_id,
                        attempt,
                        chars = completion.text.len(),
                        "Upstream completed"
                    );
                    return Ok(Forwarded {
                        completion,
                        retry_attempts: attempt,
                    });
                }
                Err(error) if error.is_timeout() && state.can_retry() => {
                    warn!(
                        request_id = %correlation_id,
                        attempt,
                        delay_ms = state.delay().as_millis() as u64,
                        error = %error,
                        "Upstream timed out, retrying"
                    );
                    sleep(state.delay()).await;
                    state.advance();
                }
                Err(error) => {
                    warn!(
                        request_id = %correlation_id,
                        attempt,
                        error = %error,
                        "Upstream call failed"
                    );
                    return Err(ForwardFailure {
                        error,
                        retry_attempts: attempt,
                    });
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ChatUsage> for TokenUsage {
    fn from(usage: ChatUsage) -> Self {
        TokenUsage {
            prompt: usage.prompt_tokens,
            completion: usage.completion_tokens,
            total: usage.total_tokens,
        }
    }
}

/// reqwest transport for an OpenAI-compatible completions endpoint
pub struct HttpTransport {
    client: Client,
    url: String,
    health_url: Option<String>,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    health_timeout: Duration,
}

impl HttpTransport {
    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .build()
            .map_err(|e| UpstreamError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.upstream_url.clone(),
            health_url: config.upstream_health_url.clone(),
            api_key: config.upstream_api_key.clone(),
            model: config.upstream_model.clone(),
            max_tokens: config.upstream_max_tokens,
            temperature: config.upstream_temperature,
            health_timeout: Duration::from_millis(config.health_check_timeout_ms),
        })
    }

    fn chat_request<'a>(&'a self, query: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: query,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, correlation_id: &str) -> Result<(), UpstreamError> {
        let Some(health_url) = &self.health_url else {
            return Ok(());
        };

        let response = self
            .client
            .get(health_url)
            .header("X-Request-ID", correlation_id)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(format!("Health check failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(UpstreamError::Unavailable(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }

    async fn complete(
        &self,
        query: &str,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<Completion, UpstreamError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("X-Request-ID", correlation_id)
            .timeout(timeout)
            .json(&self.chat_request(query));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| classify(e, timeout))?;
        let model = parsed.model;
        let usage = parsed.usage.map(TokenUsage::from);
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| UpstreamError::InvalidResponse("no completion choices".to_string()))?;

        Ok(Completion { text, model, usage })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if err.is_decode() {
        UpstreamError::InvalidResponse(err.to_string())
    } else {
        UpstreamError::Unavailable(err.to_string())
    }
}

/// Prefer the backend's `error.message`, fall back to the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.to_string())
}
