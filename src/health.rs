use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::config::Config;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub service: String,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
    pub upstream: UpstreamStatus,
    pub rate_limit: RateLimitStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamStatus {
    pub url: String,
    pub model: String,
    pub api: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub backend: String,
    pub max_requests: u32,
    pub window_ms: u64,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

/// Reports static facts about the gateway; never touches the upstream.
pub struct HealthChecker {
    environment: String,
    upstream: UpstreamStatus,
    max_requests: u32,
    window_ms: u64,
}

impl HealthChecker {
    pub fn new(config: &Config) -> Self {
        // Pin the uptime origin at construction.
        let _ = *START_TIME;

        let api = if config.upstream_api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            "configured"
        } else {
            "not configured"
        };

        Self {
            environment: config.environment.to_string(),
            upstream: UpstreamStatus {
                url: config.upstream_url.clone(),
                model: config.upstream_model.clone(),
                api: api.to_string(),
            },
            max_requests: config.rate_limit_max_requests,
            window_ms: config.rate_limit_window_ms,
        }
    }

    pub fn check_health(&self, store_backend: &str) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        HealthStatus {
            status: "healthy".to_string(),
            timestamp: now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            service: "api-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: self.environment.clone(),
            uptime_seconds: uptime,
            upstream: self.upstream.clone(),
            rate_limit: RateLimitStatus {
                backend: store_backend.to_string(),
                max_requests: self.max_requests,
                window_ms: self.window_ms,
            },
        }
    }
}
