use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Terminal state of an `/ask` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Answered by the upstream
    Completed,
    /// Answered by the fallback generator
    Degraded,
    /// Refused before reaching the upstream (auth, validation, rate limit)
    Rejected,
    /// Upstream failure surfaced as an error
    Failed,
    /// Cut off by the request deadline
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMetrics {
    pub total_requests: u64,
    pub completed: u64,
    pub degraded: u64,
    pub rejected: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub retry_attempts: u64,
    pub last_reset: u64,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            completed: 0,
            degraded: 0,
            rejected: 0,
            failed: 0,
            timed_out: 0,
            retry_attempts: 0,
            last_reset: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<GatewayMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, outcome: Outcome, retry_attempts: u32) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.retry_attempts += u64::from(retry_attempts);
        match outcome {
            Outcome::Completed => metrics.completed += 1,
            Outcome::Degraded => metrics.degraded += 1,
            Outcome::Rejected => metrics.rejected += 1,
            Outcome::Failed => metrics.failed += 1,
            Outcome::TimedOut => metrics.timed_out += 1,
        }
    }

    pub async fn snapshot(&self) -> GatewayMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = GatewayMetrics::default();
    }
}
