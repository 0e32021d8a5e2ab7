//! Failure policy state machine.
//!
//! Every dispatched attempt ends in one outcome, and [`FailurePolicy::decide`]
//! maps `(attempt, outcome)` to exactly one [`Decision`]:
//!
//! ```text
//!                     ┌────────── 2xx ──────────▶ Success
//!                     │
//!   Attempt::First ───┼────────── 401 ──────────▶ Unauthorized (terminal)
//!                     │
//!                     ├────────── 429 ──────────▶ Retry { delay } ──▶ Attempt::Retried
//!                     │
//!                     └── other status / error ─▶ Fail (terminal)
//!
//!   Attempt::Retried ─┬────────── 429 ──────────▶ Fail(RateLimited) (terminal)
//!                     └── anything else ────────▶ same as Attempt::First
//! ```
//!
//! The function is pure: side effects (sleeping, resetting the session) are
//! carried out by the client according to the returned decision.

use std::time::Duration;

use gatehouse_core::{TransportError, TransportResponse};
use http::StatusCode;

use crate::config::{AuthConfig, RetryConfig};
use crate::error::ApiError;

/// Which attempt of a logical call produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The original dispatch.
    First,
    /// The single re-dispatch after a rate-limited first attempt.
    Retried,
}

/// What the client does next with an attempt's outcome.
#[derive(Debug)]
pub enum Decision {
    /// Terminal success; decode and hand back the response.
    Success(TransportResponse),
    /// Wait `delay`, then dispatch the same request once more.
    Retry {
        /// How long to wait before the retry.
        delay: Duration,
    },
    /// Terminal 401.
    Unauthorized {
        /// Clear the credential and fire the session hooks. `false` when the
        /// rejected call was the login call itself.
        reset_session: bool,
    },
    /// Terminal failure, handed to the caller unchanged.
    Fail(ApiError),
}

/// Classifies attempt outcomes.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    default_delay: Duration,
    max_delay: Duration,
    retry_after_header: String,
    login_path: String,
}

impl FailurePolicy {
    /// Builds the policy from configuration.
    pub fn new(retry: &RetryConfig, auth: &AuthConfig) -> Self {
        Self {
            default_delay: retry.default_delay,
            max_delay: retry.max_delay,
            retry_after_header: retry.retry_after_header.clone(),
            login_path: auth.login_path.clone(),
        }
    }

    /// Decides what to do with one attempt's outcome.
    pub fn decide(
        &self,
        attempt: Attempt,
        path: &str,
        outcome: Result<TransportResponse, TransportError>,
    ) -> Decision {
        let response = match outcome {
            Ok(response) => response,
            Err(error) => return Decision::Fail(ApiError::Network(error)),
        };

        match response.status() {
            status if status.is_success() => Decision::Success(response),
            StatusCode::UNAUTHORIZED => Decision::Unauthorized {
                reset_session: !self.targets_login(path),
            },
            StatusCode::TOO_MANY_REQUESTS => match attempt {
                Attempt::First => Decision::Retry {
                    delay: self.retry_delay(&response),
                },
                Attempt::Retried => Decision::Fail(ApiError::RateLimited {
                    retry_after: self.retry_after(&response),
                }),
            },
            status => Decision::Fail(ApiError::Http {
                status,
                body: response.into_body(),
            }),
        }
    }

    /// Delay before the retry: the server's hint if usable, else the default,
    /// capped at the configured maximum.
    pub fn retry_delay(&self, response: &TransportResponse) -> Duration {
        self.retry_after(response)
            .unwrap_or(self.default_delay)
            .min(self.max_delay)
    }

    /// Parses the retry-after header as (possibly fractional) seconds.
    pub fn retry_after(&self, response: &TransportResponse) -> Option<Duration> {
        let raw = response.header_str(&self.retry_after_header)?;
        let seconds: f64 = raw.trim().parse().ok()?;
        Duration::try_from_secs_f64(seconds).ok()
    }

    /// Whether `path` is the login endpoint (query string and trailing slash ignored).
    pub fn targets_login(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
        let login = self.login_path.trim_end_matches('/');
        !login.is_empty() && path.ends_with(login)
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default(), &AuthConfig::default())
    }
}
