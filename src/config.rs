use envconfig::Envconfig;
use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Deployment mode. Only the literal `development` enables the relaxed
/// behaviour; every other value is treated as production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "development" {
            Ok(Environment::Development)
        } else {
            Ok(Environment::Production)
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Interface the HTTP server binds to
    #[envconfig(from = "HOST", default = "0.0.0.0")]
    pub host: IpAddr,

    #[envconfig(from = "PORT", default = "4000")]
    pub port: u16,

    /// `development` enables fallback responses and disables API key checks
    #[envconfig(from = "APP_ENV", default = "production")]
    pub environment: Environment,

    /// Key clients must present in production
    #[envconfig(from = "API_KEY")]
    pub api_key: Option<String>,

    /// Chat completions endpoint of the upstream LLM API
    #[envconfig(
        from = "UPSTREAM_URL",
        default = "https://api.deepseek.com/v1/chat/completions"
    )]
    pub upstream_url: String,

    /// Liveness probe; skipped when unset
    #[envconfig(from = "UPSTREAM_HEALTH_URL")]
    pub upstream_health_url: Option<String>,

    #[envconfig(from = "UPSTREAM_API_KEY")]
    pub upstream_api_key: Option<String>,

    #[envconfig(from = "UPSTREAM_MODEL", default = "deepseek-coder")]
    pub upstream_model: String,

    #[envconfig(from = "UPSTREAM_MAX_TOKENS", default = "4096")]
    pub upstream_max_tokens: u32,

    #[envconfig(from = "UPSTREAM_TEMPERATURE", default = "0.2")]
    pub upstream_temperature: f32,

    /// Timeout of the first upstream attempt
    #[envconfig(from = "UPSTREAM_TIMEOUT_MS", default = "120000")]
    pub upstream_timeout_ms: u64,

    /// Added to the upstream timeout for every retry
    #[envconfig(from = "UPSTREAM_TIMEOUT_STEP_MS", default = "30000")]
    pub upstream_timeout_step_ms: u64,

    #[envconfig(from = "HEALTH_CHECK_TIMEOUT_MS", default = "5000")]
    pub health_check_timeout_ms: u64,

    /// Retries after the first attempt, timeouts only
    #[envconfig(from = "MAX_RETRY_ATTEMPTS", default = "2")]
    pub max_retry_attempts: u32,

    #[envconfig(from = "RETRY_DELAY_MS", default = "3000")]
    pub retry_delay_ms: u64,

    /// Ceiling for a whole inbound request
    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "30000")]
    pub request_timeout_ms: u64,

    #[envconfig(from = "RATE_LIMIT_MAX_REQUESTS", default = "60")]
    pub rate_limit_max_requests: u32,

    #[envconfig(from = "RATE_LIMIT_WINDOW_MS", default = "60000")]
    pub rate_limit_window_ms: u64,

    /// Shared window store for multi-instance deployments
    #[envconfig(from = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Key clients by X-Forwarded-For / X-Real-IP instead of the socket peer
    #[envconfig(from = "TRUST_PROXY_HEADERS", default = "false")]
    pub trust_proxy_headers: bool,

    /// Comma separated CORS allow-list used outside development
    #[envconfig(
        from = "FRONTEND_URLS",
        default = "http://localhost:5173,http://localhost:5174"
    )]
    pub frontend_urls: String,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn frontend_origins(&self) -> Vec<String> {
        self.frontend_urls
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}
