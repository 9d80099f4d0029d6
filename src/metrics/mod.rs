//! Request metrics: per-alias counters plus latency bucket counters, kept in
//! a pluggable counter store.

pub mod intervals;
pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Reserved alias under which every processed request is also counted.
pub const ALL_ALIASES: &str = "ALL";

/// Suffix appended to aliases to form the stored counter key.
pub const TOTAL_SUFFIX: &str = "_total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key/value counter backend.
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str) -> Result<(), StoreError>;

    /// Returns the stored value, or `None` for a key never incremented.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Observation surface the request path reports into. Implementations must
/// never fail the caller; metrics are best-effort.
#[async_trait::async_trait]
pub trait Metrics: Send + Sync {
    /// Counts one processed request under `alias` and under [`ALL_ALIASES`].
    async fn processed_response(&self, alias: &str);

    /// Buckets the response latency and bumps the matching bucket counter.
    async fn record_latency(&self, elapsed: Duration);

    /// Renders every stored counter as indented `key: value` lines.
    async fn get_all_key_values(&self) -> Vec<String>;
}

/// Store-backed metrics. Store failures are logged and swallowed so a
/// counter outage never turns into a request failure.
pub struct RequestMetrics {
    store: Arc<dyn CounterStore>,
}

impl RequestMetrics {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    async fn bump(&self, key: &str) {
        if let Err(err) = self.store.increment(key).await {
            warn!(key, %err, "failed to increment counter");
        }
    }
}

#[async_trait::async_trait]
impl Metrics for RequestMetrics {
    async fn processed_response(&self, alias: &str) {
        self.bump(&format!("{alias}{TOTAL_SUFFIX}")).await;
        // Counting under the reserved alias directly must not double the
        // aggregate.
        if alias != ALL_ALIASES {
            self.bump(&format!("{ALL_ALIASES}{TOTAL_SUFFIX}")).await;
        }
    }

    async fn record_latency(&self, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.bump(intervals::convert_time_to_interval(millis)).await;
    }

    async fn get_all_key_values(&self) -> Vec<String> {
        let mut keys = match self.store.list_keys().await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(%err, "failed to list counters");
                return vec![format!("  error listing counters: {err}")];
            }
        };
        keys.sort();

        let mut lines = Vec::with_capacity(keys.len());
        for key in keys {
            match self.store.get(&key).await {
                Ok(Some(value)) => lines.push(format!("  {key}: {value}")),
                Ok(None) => lines.push(format!("  {key}: 0")),
                Err(err) => lines.push(format!("  {key}: error ({err})")),
            }
        }
        lines
    }
}

/// No-op metrics used when counters are disabled in the config.
pub struct DisabledMetrics;

#[async_trait::async_trait]
impl Metrics for DisabledMetrics {
    async fn processed_response(&self, _alias: &str) {}

    async fn record_latency(&self, _elapsed: Duration) {}

    async fn get_all_key_values(&self) -> Vec<String> {
        vec!["metrics are disabled".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryCounterStore;
    use super::*;

    fn metrics() -> RequestMetrics {
        RequestMetrics::new(Arc::new(MemoryCounterStore::new()))
    }

    #[tokio::test]
    async fn processed_response_counts_alias_and_aggregate() {
        let metrics = metrics();
        metrics.processed_response("alias1").await;
        metrics.processed_response("alias1").await;
        metrics.processed_response("alias2").await;

        let lines = metrics.get_all_key_values().await;
        assert!(lines.contains(&"  ALL_total: 3".to_string()));
        assert!(lines.contains(&"  alias1_total: 2".to_string()));
        assert!(lines.contains(&"  alias2_total: 1".to_string()));
    }

    #[tokio::test]
    async fn direct_aggregate_alias_is_not_double_counted() {
        let metrics = metrics();
        metrics.processed_response("alias1").await;
        metrics.processed_response("alias1").await;
        metrics.processed_response("ALL").await;

        // Two implicit aggregate bumps plus one explicit, never four.
        let lines = metrics.get_all_key_values().await;
        assert!(lines.contains(&"  ALL_total: 3".to_string()));
        assert!(lines.contains(&"  alias1_total: 2".to_string()));
    }

    #[tokio::test]
    async fn record_latency_lands_in_the_right_bucket() {
        let metrics = metrics();
        metrics.record_latency(Duration::from_millis(3)).await;
        metrics.record_latency(Duration::from_millis(4)).await;
        metrics.record_latency(Duration::from_millis(800)).await;

        let lines = metrics.get_all_key_values().await;
        assert!(lines.contains(&"  0ms-5ms: 2".to_string()));
        assert!(lines.contains(&"  750ms-1s: 1".to_string()));
    }

    #[tokio::test]
    async fn listing_output_is_sorted_and_indented() {
        let metrics = metrics();
        metrics.processed_response("zeta").await;
        metrics.processed_response("alpha").await;

        let lines = metrics.get_all_key_values().await;
        assert!(lines.iter().all(|l| l.starts_with("  ")));
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }

    #[tokio::test]
    async fn disabled_metrics_reports_itself() {
        let metrics = DisabledMetrics;
        metrics.processed_response("alias1").await;
        metrics.record_latency(Duration::from_millis(10)).await;
        assert_eq!(
            metrics.get_all_key_values().await,
            vec!["metrics are disabled".to_string()]
        );
    }
}
