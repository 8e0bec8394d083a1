//! Per-client window state storage
//!
//! The rate limiter keeps no state of its own; it reads and writes
//! [`ClientWindowState`] through a [`WindowStore`], so the backing store can
//! be swapped (in-process map, Redis shared between instances).

pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

pub use self::redis::RedisWindowStore;

/// Counter for one client inside the current fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientWindowState {
    pub request_count: u32,
    pub window_started_at_ms: u64,
}

impl ClientWindowState {
    pub fn fresh(now_ms: u64) -> Self {
        Self {
            request_count: 1,
            window_started_at_ms: now_ms,
        }
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.window_started_at_ms)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Lock poisoned: {0}")]
    Poisoned(String),

    #[error("Corrupt window state for key {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<ClientWindowState>, StoreError>;

    async fn set(
        &self,
        key: &str,
        state: ClientWindowState,
        window_ms: u64,
    ) -> Result<(), StoreError>;

    /// Drop every entry whose window ended more than `window_ms` before `now_ms`.
    /// Returns the number of removed entries.
    async fn sweep(&self, now_ms: u64, window_ms: u64) -> Result<usize, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;

    fn backend(&self) -> &'static str;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: RwLock<HashMap<String, ClientWindowState>>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn get(&self, key: &str) -> Result<Option<ClientWindowState>, StoreError> {
        let windows = self
            .windows
            .read()
            .map_err(|_| StoreError::Poisoned("Failed to acquire read lock on windows".to_string()))?;

        Ok(windows.get(key).copied())
    }

    async fn set(
        &self,
        key: &str,
        state: ClientWindowState,
        _window_ms: u64,
    ) -> Result<(), StoreError> {
        let mut windows = self
            .windows
            .write()
            .map_err(|_| StoreError::Poisoned("Failed to acquire write lock on windows".to_string()))?;

        windows.insert(key.to_string(), state);
        Ok(())
    }

    async fn sweep(&self, now_ms: u64, window_ms: u64) -> Result<usize, StoreError> {
        let mut windows = self
            .windows
            .write()
            .map_err(|_| StoreError::Poisoned("Failed to acquire write lock on windows".to_string()))?;

        let initial_count = windows.len();
        windows.retain(|_, state| state.elapsed_ms(now_ms) <= window_ms);

        Ok(initial_count - windows.len())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let windows = self
            .windows
            .read()
            .map_err(|_| StoreError::Poisoned("Failed to acquire read lock on windows".to_string()))?;

        Ok(windows.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
