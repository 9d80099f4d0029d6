//! Redis-backed counter store so counters survive restarts and can be
//! shared by several gateway instances.

use redis::aio::ConnectionManager;
use tracing::info;

use super::{CounterStore, StoreError};

pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connects to the Redis instance at `url`. The connection manager
    /// reconnects on its own after transient failures.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        info!(url, "connected to redis counter store");
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(value)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}
