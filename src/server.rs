use crate::auth::ApiKeyAuth;
use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::handlers::{ask, docs, health_check, metrics, not_found, AppState, SharedState};
use crate::middleware::{
    logging_middleware, request_id_middleware, request_timeout_middleware, RequestDeadline,
    REQUEST_ID_HEADER,
};
use crate::rate_limiter::{now_ms, RateLimiter};
use crate::retry::RetryConfig;
use crate::store::{MemoryWindowStore, RedisWindowStore, WindowStore};
use crate::upstream::{HttpTransport, Transport, UpstreamClient};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct Server {
    app: Router,
    state: SharedState,
    bind_addr: SocketAddr,
    sweep_interval: Duration,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, GatewayError> {
        let state = assemble(&config).await?;

        Ok(Self {
            app: router(state.clone(), &config),
            state,
            bind_addr: config.bind_addr(),
            sweep_interval: config.rate_limit_window(),
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Ask gateway starting on {}", self.bind_addr);
        tracing::info!("Environment: {}", self.state.gateway.environment());
        tracing::info!("Health check available at /health");

        let sweeper = spawn_sweeper(self.state.gateway.limiter().clone(), self.sweep_interval);

        // Run server with graceful shutdown
        let served = axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.abort();
        served?;

        Ok(())
    }
}

/// Build the full application from configuration, talking to the configured
/// upstream over HTTP.
pub async fn create_app(config: Config) -> Result<Router, GatewayError> {
    let state = assemble(&config).await?;
    Ok(router(state, &config))
}

async fn assemble(config: &Config) -> Result<SharedState, GatewayError> {
    let transport = Arc::new(
        HttpTransport::from_config(config).map_err(|e| GatewayError::Config(e.to_string()))?,
    );
    let store = window_store(config).await;

    Ok(build_state(config, transport, store))
}

pub fn build_state(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn WindowStore>,
) -> SharedState {
    let retry = RetryConfig {
        max_retries: config.max_retry_attempts,
        delay: Duration::from_millis(config.retry_delay_ms),
        base_timeout: Duration::from_millis(config.upstream_timeout_ms),
        timeout_step: Duration::from_millis(config.upstream_timeout_step_ms),
    };

    let gateway = Gateway::new(
        config.environment,
        ApiKeyAuth::new(config.environment, config.api_key.clone()),
        RateLimiter::new(
            store,
            config.rate_limit_max_requests,
            config.rate_limit_window_ms,
        ),
        UpstreamClient::new(transport, retry),
    );

    Arc::new(AppState::new(gateway, config))
}

pub fn router(state: SharedState, config: &Config) -> Router {
    let deadline = RequestDeadline {
        timeout: config.request_timeout(),
        environment: state.gateway.environment(),
        metrics: state.gateway.metrics().clone(),
    };

    Router::new()
        .route("/ask", post(ask))
        .route("/process", post(ask))
        .route("/health", get(health_check))
        .route("/docs", get(docs))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config))
                .layer(middleware::from_fn(request_id_middleware))
                .layer(middleware::from_fn(logging_middleware))
                .layer(middleware::from_fn_with_state(
                    deadline,
                    request_timeout_middleware,
                )),
        )
}

/// Redis when configured and reachable, otherwise the in-process store.
async fn window_store(config: &Config) -> Arc<dyn WindowStore> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        return Arc::new(MemoryWindowStore::new());
    };

    match RedisWindowStore::connect(redis_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, running in local-only mode");
            Arc::new(MemoryWindowStore::new())
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.environment.is_development() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .frontend_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .allow_credentials(true)
}

/// Periodically drop expired rate limit windows
pub fn spawn_sweeper(limiter: RateLimiter, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep(now_ms()).await;
            if removed > 0 {
                tracing::debug!(removed, "Swept expired rate limit windows");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
