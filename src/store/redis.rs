//! Redis-backed window store
//!
//! Each client window is a hash `{count, started}` that expires one window
//! after it was last written, so Redis does the sweeping.

use async_trait::async_trait;
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};

use super::{ClientWindowState, StoreError, WindowStore};

const KEY_PREFIX: &str = "ask-gateway:window:";

#[derive(Clone)]
pub struct RedisWindowStore {
    connection: MultiplexedConnection,
}

impl RedisWindowStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;

        tracing::info!("Connected window store to Redis");
        Ok(Self { connection })
    }

    fn window_key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn get(&self, key: &str) -> Result<Option<ClientWindowState>, StoreError> {
        let mut conn = self.connection.clone();
        let redis_key = Self::window_key(key);

        let (count, started): (Option<u32>, Option<u64>) = ::redis::cmd("HMGET")
            .arg(&redis_key)
            .arg("count")
            .arg("started")
            .query_async(&mut conn)
            .await?;

        match (count, started) {
            (Some(request_count), Some(window_started_at_ms)) => Ok(Some(ClientWindowState {
                request_count,
                window_started_at_ms,
            })),
            (None, None) => Ok(None),
            _ => Err(StoreError::Corrupt(redis_key)),
        }
    }

    async fn set(
        &self,
        key: &str,
        state: ClientWindowState,
        window_ms: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let redis_key = Self::window_key(key);

        ::redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&redis_key)
            .arg("count")
            .arg(state.request_count)
            .arg("started")
            .arg(state.window_started_at_ms)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&redis_key)
            .arg(window_ms.max(1))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn sweep(&self, _now_ms: u64, _window_ms: u64) -> Result<usize, StoreError> {
        // Keys carry their own PEXPIRE.
        Ok(0)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", KEY_PREFIX);

        let mut keys = conn.scan_match::<_, String>(pattern).await?;
        let mut count = 0;
        while keys.next_item().await.is_some() {
            count += 1;
        }

        Ok(count)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
