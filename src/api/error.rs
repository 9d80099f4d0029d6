use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::router::RouterError;
use crate::services::auth_service::AuthError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),

    QuotaExceeded(String),

    Throttled(String),

    ClosedEndpoint(String),

    BadRequest(String),

    RouteFailed(String),

    UpstreamFailed(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::QuotaExceeded(msg) => write!(f, "Quota exceeded: {}", msg),
            ApiError::Throttled(msg) => write!(f, "Throttled: {}", msg),
            ApiError::ClosedEndpoint(msg) => write!(f, "Endpoint closed: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::RouteFailed(msg) => write!(f, "Routing failed: {}", msg),
            ApiError::UpstreamFailed(msg) => write!(f, "Upstream failed: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::QuotaExceeded(msg) | ApiError::Throttled(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }
            ApiError::ClosedEndpoint(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::RouteFailed(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::UpstreamFailed(msg) => {
                tracing::warn!("Upstream request failed: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream data node is unavailable".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": error_message });
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::QuotaExceeded { .. } => ApiError::QuotaExceeded(err.to_string()),
            AuthError::EmptyKey | AuthError::KeyNotFound => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Storage(msg) | AuthError::Internal(msg) => ApiError::InternalError(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        ApiError::RouteFailed(err.to_string())
    }
}
