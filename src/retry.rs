//! Bounded retry schedule for upstream calls
//!
//! The delay between attempts is fixed and every retry gets a larger timeout
//! budget than the one before: attempt `n` may take `base + n * step`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay: Duration,
    pub base_timeout: Duration,
    pub timeout_step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_millis(3_000),
            base_timeout: Duration::from_millis(120_000),
            timeout_step: Duration::from_millis(30_000),
        }
    }
}

/// State of one forwarded call. Lives only as long as its attempt chain.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    attempt: u32,
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Zero-based index of the current attempt
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries + 1
    }

    /// Timeout budget for the current attempt
    pub fn timeout(&self) -> Duration {
        self.config.base_timeout + self.config.timeout_step * self.attempt
    }

    pub fn delay(&self) -> Duration {
        self.config.delay
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.config.max_retries
    }

    /// Move to the next attempt. Returns false once the ceiling is reached.
    pub fn advance(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.attempt += 1;
        true
    }
}
