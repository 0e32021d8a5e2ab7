//! The network seam.
//!
//! The client pipeline never talks to a socket itself. It hands a prepared
//! [`OutgoingRequest`] to a [`Transport`] and gets back a
//! [`TransportResponse`] or a [`TransportError`]. Any HTTP stack can sit
//! behind it; `gatehouse-reqwest` provides the reqwest one.
//!
//! # Examples
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use gatehouse_core::{OutgoingRequest, Transport, TransportError, TransportResponse};
//! use http::StatusCode;
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl Transport for Fixed {
//!     async fn send(&self, _req: OutgoingRequest) -> Result<TransportResponse, TransportError> {
//!         Ok(TransportResponse::with_status(StatusCode::OK, "[]"))
//!     }
//! }
//! ```

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;

use crate::request::OutgoingRequest;
use crate::response::TransportResponse;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Sends prepared requests over the network.
///
/// Non-2xx statuses are **not** errors at this level; they come back as a
/// normal [`TransportResponse`] and are classified by the client's failure
/// policy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and reads the whole response body.
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        self.as_ref().send(request).await
    }
}

/// Transport-level failure: nothing usable came back from the server.
///
/// Cheap to clone so one failure can be handed to every deduplicated caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established or was dropped.
    #[error("connection error: {0}")]
    Connection(SharedError),

    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(SharedError),

    /// The request could not be built (bad URL, unserializable body).
    #[error("invalid request: {0}")]
    Request(SharedError),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(SharedError),
}

impl TransportError {
    /// Wraps a connection failure.
    pub fn connection<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Connection(Arc::new(error))
    }

    /// Wraps a timeout.
    pub fn timeout<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Timeout(Arc::new(error))
    }

    /// Wraps a request construction failure.
    pub fn request<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Request(Arc::new(error))
    }

    /// Wraps a body read failure.
    pub fn body<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Body(Arc::new(error))
    }

    /// Short name of the failure class, for logs and metric labels.
    pub const fn kind(&self) -> &'static str {
        match self {
            TransportError::Connection(_) => "connection",
            TransportError::Timeout(_) => "timeout",
            TransportError::Request(_) => "request",
            TransportError::Body(_) => "body",
        }
    }
}
