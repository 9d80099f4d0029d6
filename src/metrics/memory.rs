//! In-process counter store, the default when no Redis URL is configured.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{CounterStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: RwLock<HashMap<String, u64>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<(), StoreError> {
        let mut counters = self
            .counters
            .write()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        *counters.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let counters = self
            .counters
            .read()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(counters.get(key).map(ToString::to_string))
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let counters = self
            .counters
            .read()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(counters.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increments_accumulate_per_key() {
        let store = MemoryCounterStore::new();
        store.increment("a").await.unwrap();
        store.increment("a").await.unwrap();
        store.increment("b").await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some("2".to_string()));
        assert_eq!(store.get("b").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);

        let mut keys = store.list_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
