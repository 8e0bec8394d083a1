use crate::config::Environment;
use crate::error::GatewayError;

/// Canned reply used when the upstream cannot answer. The query is echoed
/// verbatim.
pub fn fallback(query: &str) -> String {
    format!(
        "This is a fallback response for: \"{}\"\n\n\
         The AI Processing Service is currently unavailable. \
         This would normally connect to the AI service for processing.",
        query
    )
}

/// Same as [`fallback`], prefixed with the number of attempts that were made.
pub fn fallback_after_attempts(query: &str, attempts: u32) -> String {
    if attempts <= 1 {
        return fallback(query);
    }
    format!(
        "After {} attempts, the request still timed out. Using fallback response:\n\n{}",
        attempts,
        fallback(query)
    )
}

/// Only development deployments may answer with fabricated content.
#[derive(Debug, Clone, Copy)]
pub struct FallbackGenerator {
    environment: Environment,
}

impl FallbackGenerator {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    pub fn enabled(&self) -> bool {
        self.environment.is_development()
    }

    pub fn generate(&self, query: &str, attempts: u32) -> Result<String, GatewayError> {
        if !self.enabled() {
            return Err(GatewayError::UpstreamUnavailable(
                "AI Processing Service is currently unavailable".to_string(),
            ));
        }
        Ok(fallback_after_attempts(query, attempts))
    }
}
