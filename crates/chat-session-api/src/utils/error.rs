use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::SessionError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited: {0}")]
    RateLimited(String, Option<u64>),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let msg = e.to_string();
        match e {
            // Not produced by the current routes: roles come from the request
            // shape and the namespace is checked at startup. Library callers
            // of the tagged parsers and `Namespace::new` still surface them.
            SessionError::InvalidRole(_) => ApiError::BadRequest(msg),
            SessionError::InvalidNamespace(_) => ApiError::InternalError(msg),
            SessionError::RateLimited { retry_after_ms } => ApiError::RateLimited(msg, retry_after_ms),
            SessionError::UpstreamTimeout(_) => ApiError::UpstreamTimeout(msg),
            SessionError::Upstream(_) | SessionError::InvalidResponse(_) => ApiError::LlmError(msg),
            SessionError::StoreUnavailable(_) => ApiError::StoreUnavailable(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            },
            ApiError::RateLimited(msg, retry_after_ms) => {
                tracing::warn!("Rate limited: {}", msg);
                retry_after = retry_after_ms.map(|ms| ms.div_ceil(1000));
                (StatusCode::TOO_MANY_REQUESTS, "RateLimited", msg)
            },
            ApiError::UpstreamTimeout(msg) => {
                tracing::error!("Upstream timeout: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, "UpstreamTimeout", msg)
            },
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (StatusCode::BAD_GATEWAY, "LlmError", msg)
            },
            ApiError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "StoreUnavailable", msg)
            },
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
