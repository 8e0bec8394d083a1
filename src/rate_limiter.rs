use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::response::RateDecision;
use crate::store::{ClientWindowState, WindowStore};

/// Bucket shared by every caller whose address could not be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Fixed-window request counter keyed by client id.
///
/// The limiter is advisory: a failing store admits the request instead of
/// rejecting it, and concurrent increments on the same key may be lost.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    max_requests: u32,
    window_ms: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, max_requests: u32, window_ms: u64) -> Self {
        Self {
            store,
            max_requests,
            window_ms,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn admit_now(&self, client_id: &str) -> RateDecision {
        self.admit(client_id, now_ms()).await
    }

    /// Count one request for `client_id` at `now_ms` and decide whether it
    /// may proceed.
    pub async fn admit(&self, client_id: &str, now_ms: u64) -> RateDecision {
        let key = if client_id.trim().is_empty() {
            UNKNOWN_CLIENT
        } else {
            client_id
        };

        let current = match self.store.get(key).await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(client_id = %key, error = %e, "Window store read failed, admitting request");
                return RateDecision::allowed(self.max_requests, self.max_requests, now_ms + self.window_ms);
            }
        };

        let state = match current {
            Some(state) if state.elapsed_ms(now_ms) < self.window_ms => ClientWindowState {
                request_count: state.request_count.saturating_add(1),
                window_started_at_ms: state.window_started_at_ms,
            },
            _ => ClientWindowState::fresh(now_ms),
        };

        if let Err(e) = self.store.set(key, state, self.window_ms).await {
            tracing::warn!(client_id = %key, error = %e, "Window store write failed");
        }

        let reset_at_ms = state.window_started_at_ms + self.window_ms;

        if state.request_count > self.max_requests {
            let retry_after_ms = self.window_ms - state.elapsed_ms(now_ms);
            tracing::debug!(
                client_id = %key,
                request_count = state.request_count,
                retry_after_ms,
                "Rate limit exceeded"
            );
            RateDecision::rejected(self.max_requests, reset_at_ms, retry_after_ms)
        } else {
            RateDecision::allowed(
                self.max_requests,
                self.max_requests - state.request_count,
                reset_at_ms,
            )
        }
    }

    /// Remove expired windows. Never fails; returns how many were dropped.
    pub async fn sweep(&self, now_ms: u64) -> usize {
        match self.store.sweep(now_ms, self.window_ms).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "Window store sweep failed");
                0
            }
        }
    }

    pub async fn tracked_clients(&self) -> usize {
        self.store.len().await.unwrap_or_default()
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
