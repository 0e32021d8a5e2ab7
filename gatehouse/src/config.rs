//! Client configuration.
//!
//! [`ClientConfig`] gathers every tunable of the client pipeline. It can be
//! built in code with [`ClientConfig::builder`] or read from YAML:
//!
//! ```
//! use std::time::Duration;
//! use gatehouse::ClientConfig;
//!
//! let config = ClientConfig::from_yaml(r#"
//! base_endpoint: https://api.campus.edu
//! cache:
//!   ttl: 5s
//!   capacity: 500
//! retry:
//!   default_delay: 1200ms
//! auth:
//!   login_path: /auth/login
//! "#).unwrap();
//!
//! assert_eq!(config.cache.ttl, Duration::from_secs(5));
//! assert_eq!(config.retry.retry_after_header, "retry-after");
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_TTL;

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid YAML or does not match the schema.
    #[error("invalid client configuration: {0}")]
    Parse(String),
}

/// Marker type for unset builder fields.
///
/// This type is used in the typestate pattern for
/// [`ApiClientBuilder`](crate::ApiClientBuilder). When you see `NotSet` in a
/// compiler error, it means you haven't called the corresponding builder
/// method yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotSet;

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CacheConfig {
    /// Freshness window of cached reads (e.g. "5s", "500ms").
    #[serde(default = "CacheConfig::default_ttl", with = "humantime_serde")]
    pub ttl: Duration,
    /// Maximum number of cached responses; unbounded when absent.
    #[serde(default)]
    pub capacity: Option<NonZeroUsize>,
    /// How often stale entries are swept from memory; never when absent.
    #[serde(default, with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,
}

impl CacheConfig {
    fn default_ttl() -> Duration {
        DEFAULT_TTL
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Self::default_ttl(),
            capacity: None,
            sweep_interval: None,
        }
    }
}

/// Rate-limit retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RetryConfig {
    /// Delay before the retry when the server gives no hint.
    #[serde(default = "RetryConfig::default_delay", with = "humantime_serde")]
    pub default_delay: Duration,
    /// Upper bound on any retry delay, including server hints.
    #[serde(default = "RetryConfig::default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Response header carrying the server's retry hint, in seconds.
    #[serde(default = "RetryConfig::default_header")]
    pub retry_after_header: String,
}

impl RetryConfig {
    fn default_delay() -> Duration {
        Duration::from_millis(1200)
    }

    fn default_max_delay() -> Duration {
        Duration::from_secs(30)
    }

    fn default_header() -> String {
        "retry-after".to_owned()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_delay: Self::default_delay(),
            max_delay: Self::default_max_delay(),
            retry_after_header: Self::default_header(),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AuthConfig {
    /// Path of the login endpoint; a 401 from it never triggers a session reset.
    #[serde(default = "AuthConfig::default_login_path")]
    pub login_path: String,
    /// Authorization scheme placed before the token.
    #[serde(default = "AuthConfig::default_scheme")]
    pub scheme: String,
}

impl AuthConfig {
    fn default_login_path() -> String {
        "/auth/login".to_owned()
    }

    fn default_scheme() -> String {
        "Bearer".to_owned()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: Self::default_login_path(),
            scheme: Self::default_scheme(),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ClientConfig {
    /// Base URL every path is appended to, e.g. `https://api.campus.edu`.
    #[serde(default)]
    pub base_endpoint: String,
    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Rate-limit retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Session settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl ClientConfig {
    /// Creates a [`ClientConfigBuilder`].
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Parses a YAML document.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(source).map_err(|error| ConfigError::Parse(error.to_string()))
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the base endpoint.
    pub fn base_endpoint(mut self, base_endpoint: impl Into<String>) -> Self {
        self.config.base_endpoint = base_endpoint.into();
        self
    }

    /// Sets the cache TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    /// Bounds the cache to `capacity` entries.
    pub fn capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.config.cache.capacity = Some(capacity);
        self
    }

    /// Sweeps stale cache entries every `interval`.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.cache.sweep_interval = Some(interval);
        self
    }

    /// Sets the default retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.default_delay = delay;
        self
    }

    /// Sets the upper bound on retry delays.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.max_delay = delay;
        self
    }

    /// Sets the header the retry hint is read from.
    pub fn retry_after_header(mut self, header: impl Into<String>) -> Self {
        self.config.retry.retry_after_header = header.into();
        self
    }

    /// Sets the login endpoint path.
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.config.auth.login_path = path.into();
        self
    }

    /// Sets the authorization scheme.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.config.auth.scheme = scheme.into();
        self
    }

    /// Builds the [`ClientConfig`].
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
