#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # gatehouse
//!
//! API gateway client for the campus management backend.
//!
//! Every screen of the application talks to the backend through one
//! [`ApiClient`]. The client makes repeated reads cheap and keeps the session
//! consistent:
//!
//! - **Deduplication** - concurrent identical reads share one network call
//! - **Response cache** - a successful read is served from memory for a few seconds
//! - **Credentials** - the session token is attached to every outgoing request
//! - **Failure policy** - a 429 is retried once, a 401 resets the session
//!
//! ```rust,ignore
//! use gatehouse::{ApiClient, ClientConfig};
//! use gatehouse_reqwest::ReqwestTransport;
//!
//! let client = ApiClient::new(
//!     ReqwestTransport::new(reqwest::Client::new()),
//!     ClientConfig::builder().base_endpoint("https://api.campus.edu").build(),
//! );
//! client.session().store(token);
//!
//! let students = client.get("/students").query("dept", 5).send().await?;
//! ```
//!
//! The network itself sits behind the [`Transport`] trait, so tests run
//! against scripted transports and production code against reqwest.

/// Short-lived in-memory response cache.
///
/// [`ResponseCache`](cache::ResponseCache) maps request keys to the last
/// successful payload. Entries are fresh for a TTL (5 seconds by default)
/// and can optionally be bounded and swept.
pub mod cache;

/// The client facade and its builders.
pub mod client;

/// In-flight request deduplication.
///
/// When several callers issue the same read at once, only the first one
/// reaches the network. [`InFlightRegistry`](concurrency::InFlightRegistry)
/// hands every other caller a clone of the pending result.
pub mod concurrency;

/// Client configuration types.
///
/// Provides [`ClientConfig`] and its sections for cache, retry and session
/// settings, loadable from YAML.
pub mod config;

/// Error types for gateway calls.
///
/// Defines [`ApiError`] which covers:
/// - Transport failures
/// - Unauthorized and rate-limited responses
/// - Other HTTP statuses and body decoding failures
pub mod error;

/// Failure policy state machine.
///
/// Decides, per attempt, whether a call succeeded, is retried, resets the
/// session or fails.
pub mod failure;

/// Metrics collection for client observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Cache hits and misses, deduplicated joins
/// - Transport dispatches, rate-limit retries, unauthorized responses
/// - Call and dispatch latency
pub mod metrics;

/// Session credential and session hooks.
pub mod session;

pub use client::{ApiClient, ApiClientBuilder, RequestBuilder};
pub use config::{AuthConfig, CacheConfig, ClientConfig, ConfigError, NotSet, RetryConfig};
pub use error::{ApiError, ApiResult};
pub use session::{NoopSessionHooks, SessionCredential, SessionHooks};

pub use gatehouse_core::{
    CacheStatus, Method, OutgoingRequest, Payload, QueryParams, RequestContext,
    RequestDescriptor, RequestKey, RequestOptions, RequestPolicy, ResponseSource, Transport,
    TransportError, TransportResponse,
};

/// The `gatehouse` prelude.
///
/// ```rust
/// use gatehouse::prelude::*;
/// ```
///
/// This imports:
/// - [`ApiClient`] - the client facade
/// - [`ApiError`] and [`ApiResult`] - error handling for calls
/// - [`Transport`] - the network seam
pub mod prelude {
    pub use crate::{ApiClient, ApiError, ApiResult, Transport};
}
