use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod access;
mod error;
mod proxy;
mod throttle;

pub use access::StaticKeys;
pub use error::ApiError;
pub use throttle::FreeAccountThrottle;

use crate::db::Store;
use crate::metrics::Metrics;
use crate::router::ShardRouter;
use crate::services::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthService>,

    pub db: Store,

    pub router: Arc<ShardRouter>,

    pub metrics: Arc<dyn Metrics>,

    pub static_keys: Arc<StaticKeys>,

    pub throttle: Arc<FreeAccountThrottle>,

    pub http: reqwest::Client,

    pub closed_endpoints: Arc<Vec<String>>,

    pub max_body_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(proxy::status))
        .route("/health", get(proxy::health))
        .fallback(proxy::forward)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
