//! The forwarding path: authenticate the caller, pick the shard for the
//! requested block nonce or epoch and relay the request to it.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, trace};

use crate::common::{KeysQueue, anonymize_key, generate_key, normalize_key};
use crate::services::auth_service::{AccountType, AuthError};

use super::AppState;
use super::error::ApiError;

const API_VERSION: &str = "v1";
const HEADER_API_KEY: &str = "X-Api-Key";

const PARAM_BLOCK_NONCE: &str = "blockNonce";
const PARAM_HINT_EPOCH: &str = "hintEpoch";

/// Fallback handler: everything that is not a gateway-local route gets
/// forwarded to a shard.
pub async fn forward(State(state): State<AppState>, req: Request) -> Response {
    let started = Instant::now();
    let request_id = generate_key();

    let result = forward_inner(&state, req, &request_id).await;

    state.metrics.record_latency(started.elapsed()).await;

    match result {
        Ok(response) => response,
        Err(err) => {
            trace!(request_id, %err, "request rejected");
            err.into_response()
        }
    }
}

async fn forward_inner(
    state: &AppState,
    req: Request,
    request_id: &str,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(ToString::to_string);

    trace!(request_id, path, "received request");

    let (nonce, epoch) = parse_routing_params(query.as_deref())?;

    let (key_from_path, forwarded_path) = split_key_from_path(&path);
    let alias = authorize(state, req.headers(), key_from_path.as_deref()).await?;

    trace!(request_id, alias, "processing request");
    state.metrics.processed_response(&alias).await;

    let shard = state.router.select(nonce, epoch)?;

    let mut upstream_url = format!("{}{}", shard.url.trim_end_matches('/'), forwarded_path);
    if let Some(query) = &query {
        upstream_url.push('?');
        upstream_url.push_str(query);
    }

    if is_endpoint_closed(&state.closed_endpoints, &upstream_url) {
        return Err(ApiError::ClosedEndpoint(forwarded_path));
    }

    relay(state, req, &upstream_url, &shard.name, request_id).await
}

/// Extracts an access key from a `/v1/<key>/...` path. Paths without the
/// version segment, or too short to carry a key, pass through untouched.
fn split_key_from_path(path: &str) -> (Option<String>, String) {
    let segments: Vec<&str> = path.split('/').collect();
    // ["", "v1", "<key>", "rest", ...]
    if segments.len() < 4 || !segments[1].eq_ignore_ascii_case(API_VERSION) {
        return (None, path.to_string());
    }

    let key = normalize_key(segments[2]);
    let rest = format!("/{}", segments[3..].join("/"));
    (Some(key), rest)
}

/// Tries every supplied key candidate, config-provisioned keys first, then
/// the database. Admitted free accounts are still held against the per-period
/// call ceiling; premium accounts and static keys skip it. The first key
/// that makes it through names the metrics alias.
async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    key_from_path: Option<&str>,
) -> Result<String, ApiError> {
    let mut candidates = KeysQueue::new();
    if let Some(key) = key_from_path {
        candidates.add(key);
    }
    if let Some(value) = headers.get(HEADER_API_KEY) {
        if let Ok(value) = value.to_str() {
            candidates.add(value);
        }
    }

    if candidates.is_empty() {
        return Err(ApiError::Unauthorized("no access key provided".to_string()));
    }

    let mut last_err = ApiError::from(AuthError::KeyNotFound);
    for key in candidates.as_slice() {
        if let Some(alias) = state.static_keys.alias_for(key) {
            return Ok(alias.to_string());
        }

        match state.auth.is_key_allowed(key).await {
            Ok(admission) => {
                if admission.account_type == AccountType::Free {
                    if let Err(current) = state.throttle.check(&admission.username) {
                        trace!(key = %anonymize_key(key), current, "free account throttled");
                        last_err = ApiError::Throttled(format!(
                            "too many requests for free account: current counter: {current}, \
                             maximum per period: {}",
                            state.throttle.max_calls()
                        ));
                        continue;
                    }
                }
                return Ok(admission.username);
            }
            Err(err) => {
                trace!(key = %anonymize_key(key), %err, "key not admitted");
                last_err = ApiError::from(err);
            }
        }
    }

    Err(last_err)
}

fn parse_routing_params(query: Option<&str>) -> Result<(Option<u64>, Option<u64>), ApiError> {
    let Some(query) = query else {
        return Ok((None, None));
    };

    let mut nonce = None;
    let mut epoch = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            PARAM_BLOCK_NONCE => nonce = Some(parse_param(PARAM_BLOCK_NONCE, &value)?),
            PARAM_HINT_EPOCH => epoch = Some(parse_param(PARAM_HINT_EPOCH, &value)?),
            _ => {}
        }
    }
    Ok((nonce, epoch))
}

fn parse_param(name: &str, value: &str) -> Result<u64, ApiError> {
    value.parse().map_err(|_| {
        ApiError::BadRequest(format!("invalid value '{value}' for key {name}"))
    })
}

fn is_endpoint_closed(closed_endpoints: &[String], url: &str) -> bool {
    closed_endpoints.iter().any(|e| url.contains(e.as_str()))
}

async fn relay(
    state: &AppState,
    req: Request,
    upstream_url: &str,
    shard_name: &str,
    request_id: &str,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|err| ApiError::BadRequest(format!("unsupported method: {err}")))?;

    let body_bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|err| ApiError::BadRequest(format!("failed to read request body: {err}")))?;

    let mut upstream_headers = reqwest::header::HeaderMap::new();
    for (name, value) in &parts.headers {
        if name == &header::HOST {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_ref()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            upstream_headers.insert(name, value);
        }
    }

    let upstream_response = state
        .http
        .request(method, upstream_url)
        .headers(upstream_headers)
        .body(body_bytes)
        .send()
        .await
        .map_err(|err| {
            error!(request_id, shard_name, %err, "upstream request failed");
            ApiError::UpstreamFailed(err.to_string())
        })?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);

    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream_response.headers() {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(name.as_ref()),
            header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.insert(name, value);
        }
    }
    if let Ok(origin) = header::HeaderValue::from_str(shard_name) {
        response_headers.insert(header::HeaderName::from_static("origin"), origin);
    }

    let body = upstream_response
        .bytes()
        .await
        .map_err(|err| ApiError::UpstreamFailed(err.to_string()))?;

    trace!(request_id, "response generated");

    Ok((status, response_headers, Body::from(body)).into_response())
}

/// GET /status: every counter the metrics store holds, one per line.
pub async fn status(State(state): State<AppState>) -> String {
    let mut out = String::from("Requests statistics:\n");
    out.push_str(&state.metrics.get_all_key_values().await.join("\n"));
    out
}

/// GET /health: liveness plus one storage round trip.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => {
            error!(%err, "database ping failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response()
        }
    }
}
