use crate::config::Config;
use crate::error::GatewayError;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), GatewayError> {
        if url.is_empty() {
            return Err(GatewayError::Config(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(GatewayError::Config(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates an upstream HTTP(S) URL
    pub fn validate_http_url(name: &str, url: &str) -> Result<(), GatewayError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(GatewayError::Config(format!(
                "{} must start with 'http://' or 'https://'",
                name
            )));
        }

        Ok(())
    }

    /// Validates rate limit parameters
    pub fn validate_rate_limit(max_requests: u32, window_ms: u64) -> Result<(), GatewayError> {
        if max_requests == 0 {
            return Err(GatewayError::Config(
                "Rate limit max requests must be greater than 0".to_string(),
            ));
        }

        if window_ms == 0 {
            return Err(GatewayError::Config(
                "Rate limit window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates upstream generation parameters
    pub fn validate_generation(max_tokens: u32, temperature: f32) -> Result<(), GatewayError> {
        if max_tokens == 0 {
            return Err(GatewayError::Config(
                "Upstream max tokens must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&temperature) {
            return Err(GatewayError::Config(format!(
                "Upstream temperature {} is outside 0.0..=2.0",
                temperature
            )));
        }

        Ok(())
    }

    /// Validates the whole configuration before the server starts
    pub fn validate_config(config: &Config) -> Result<(), GatewayError> {
        Self::validate_http_url("UPSTREAM_URL", &config.upstream_url)?;
        if let Some(health_url) = &config.upstream_health_url {
            Self::validate_http_url("UPSTREAM_HEALTH_URL", health_url)?;
        }
        if let Some(redis_url) = &config.redis_url {
            Self::validate_redis_url(redis_url)?;
        }

        Self::validate_rate_limit(config.rate_limit_max_requests, config.rate_limit_window_ms)?;
        Self::validate_generation(config.upstream_max_tokens, config.upstream_temperature)?;

        for (name, value) in [
            ("REQUEST_TIMEOUT_MS", config.request_timeout_ms),
            ("UPSTREAM_TIMEOUT_MS", config.upstream_timeout_ms),
            ("HEALTH_CHECK_TIMEOUT_MS", config.health_check_timeout_ms),
        ] {
            if value == 0 {
                return Err(GatewayError::Config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if !config.environment.is_development()
            && config.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(GatewayError::Config(
                "API_KEY must be set outside development".to_string(),
            ));
        }

        if config.request_timeout_ms <= config.upstream_timeout_ms {
            tracing::warn!(
                request_timeout_ms = config.request_timeout_ms,
                upstream_timeout_ms = config.upstream_timeout_ms,
                "Request deadline is not longer than the first upstream attempt; \
                 upstream timeouts will surface as request timeouts"
            );
        }

        Ok(())
    }
}
