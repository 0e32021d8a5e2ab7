use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gatehouse_core::TransportError;
use http::StatusCode;
use thiserror::Error;

use crate::concurrency::ConcurrencyError;

/// Error type for gateway calls.
///
/// Only [`ApiError::RateLimited`] is ever recovered from inside the client
/// (by a single retry); every other variant is handed to the caller as is.
/// The type is `Clone` because one network outcome is fanned out to every
/// caller waiting on the same in-flight request.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Transport-level failure. Never retried.
    #[error(transparent)]
    Network(#[from] TransportError),

    /// The server rejected the credential (HTTP 401).
    ///
    /// By the time this is returned the session has been reset, unless the
    /// call targeted the login endpoint itself.
    #[error("unauthorized request to {path}")]
    Unauthorized {
        /// Path of the rejected call.
        path: String,
    },

    /// The server kept rate limiting the call (HTTP 429) after one retry.
    #[error("rate limited{}", retry_suffix(.retry_after))]
    RateLimited {
        /// Delay the server asked for on the final response, if any.
        retry_after: Option<Duration>,
    },

    /// Any other non-success status.
    #[error("request failed with status {status}")]
    Http {
        /// Status code.
        status: StatusCode,
        /// Raw response body, for the caller to inspect.
        body: Bytes,
    },

    /// A request body could not be encoded.
    #[error("failed to encode request body: {0}")]
    Encode(Arc<serde_json::Error>),

    /// A response body was not valid JSON or did not match the expected type.
    #[error("failed to decode response body: {0}")]
    Decode(Arc<serde_json::Error>),

    /// The dispatch task died before producing a result.
    #[error(transparent)]
    Internal(#[from] ConcurrencyError),
}

impl ApiError {
    pub(crate) fn decode(error: serde_json::Error) -> Self {
        Self::Decode(Arc::new(error))
    }

    pub(crate) fn encode(error: serde_json::Error) -> Self {
        Self::Encode(Arc::new(error))
    }

    /// Status code carried by the error, if it came from an HTTP response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short name of the error class, for logs and metric labels.
    pub const fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "network",
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Http { .. } => "http",
            ApiError::Encode(_) => "encode",
            ApiError::Decode(_) => "decode",
            ApiError::Internal(_) => "internal",
        }
    }
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(", retry after {delay:?}"),
        None => String::new(),
    }
}

/// Result alias for gateway calls.
pub type ApiResult<T> = Result<T, ApiError>;
