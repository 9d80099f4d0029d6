pub mod api;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod metrics;
pub mod router;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use api::{AppState, FreeAccountThrottle, StaticKeys};
pub use config::Config;
use db::Store;
use metrics::{DisabledMetrics, Metrics, RequestMetrics};
use router::ShardRouter;
use services::SeaOrmAuthService;

pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let shard_router = Arc::new(ShardRouter::new(&config.gateways)?);
    for shard in shard_router.loaded_shards() {
        info!(
            name = %shard.name,
            url = %shard.url,
            serves_latest = shard.serves_latest,
            "loaded gateway shard"
        );
    }

    let metrics = build_metrics(&config).await?;
    debug!(
        intervals = ?metrics::intervals::all_performance_intervals(),
        "latency buckets"
    );

    let static_keys = StaticKeys::new(&config.access_keys)?;
    info!(count = static_keys.len(), "loaded static access keys");

    let throttle = Arc::new(FreeAccountThrottle::new(config.free_account.max_calls));
    spawn_throttle_clearer(
        Arc::clone(&throttle),
        Duration::from_secs(config.free_account.clear_period_seconds),
    );

    let state = AppState {
        auth: Arc::new(SeaOrmAuthService::new(store.clone())),
        db: store,
        router: shard_router,
        metrics,
        static_keys: Arc::new(static_keys),
        throttle,
        http: reqwest::Client::new(),
        closed_endpoints: Arc::new(config.server.closed_endpoints.clone()),
        max_body_bytes: config.server.max_body_bytes,
    };

    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_metrics(config: &Config) -> anyhow::Result<Arc<dyn Metrics>> {
    if !config.counters.enabled {
        info!("request metrics disabled");
        return Ok(Arc::new(DisabledMetrics));
    }

    if config.counters.url.is_empty() {
        info!("request metrics kept in process memory");
        let store = Arc::new(metrics::memory::MemoryCounterStore::new());
        return Ok(Arc::new(RequestMetrics::new(store)));
    }

    let store = metrics::redis::RedisCounterStore::connect(&config.counters.url)
        .await
        .context("Failed to connect to the redis counter store")?;
    Ok(Arc::new(RequestMetrics::new(Arc::new(store))))
}

fn spawn_throttle_clearer(throttle: Arc<FreeAccountThrottle>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("clearing the free account call counters");
            throttle.clear();
        }
    });
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}
