//! Session error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Rate limited by completion endpoint")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl SessionError {
    /// Stable code used in SSE error events and JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidRole(_) => "INVALID_ROLE",
            SessionError::InvalidNamespace(_) => "INVALID_NAMESPACE",
            SessionError::Upstream(_) => "UPSTREAM_ERROR",
            SessionError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            SessionError::RateLimited { .. } => "RATE_LIMITED",
            SessionError::InvalidResponse(_) => "INVALID_RESPONSE",
            SessionError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(e: redis::RedisError) -> Self {
        SessionError::StoreUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SessionError::UpstreamTimeout(e.to_string())
        } else if e.is_decode() {
            SessionError::InvalidResponse(e.to_string())
        } else {
            SessionError::Upstream(e.to_string())
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
