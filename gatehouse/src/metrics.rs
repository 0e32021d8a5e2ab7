//! Metrics declaration and initialization.

use std::time::Duration;

use gatehouse_core::RequestContext;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Cache status metrics

    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "gatehouse_cache_hit_total",
            "Total number of reads answered from the response cache."
        );
        "gatehouse_cache_hit_total"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "gatehouse_cache_miss_total",
            "Total number of cacheable reads not answered from the cache."
        );
        "gatehouse_cache_miss_total"
    };

    // Deduplication metrics

    /// Track number of callers that joined an in-flight request.
    pub static ref DEDUP_JOIN_COUNTER: &'static str = {
        metrics::describe_counter!(
            "gatehouse_dedup_join_total",
            "Total number of callers that joined an in-flight request."
        );
        "gatehouse_dedup_join_total"
    };

    // Dispatch metrics

    /// Track number of requests handed to the transport.
    pub static ref DISPATCH_COUNTER: &'static str = {
        metrics::describe_counter!(
            "gatehouse_dispatch_total",
            "Total number of requests handed to the transport."
        );
        "gatehouse_dispatch_total"
    };
    /// Track number of rate-limit retries.
    pub static ref RATE_LIMIT_RETRY_COUNTER: &'static str = {
        metrics::describe_counter!(
            "gatehouse_rate_limit_retry_total",
            "Total number of requests retried after a 429."
        );
        "gatehouse_rate_limit_retry_total"
    };
    /// Track number of unauthorized responses.
    pub static ref UNAUTHORIZED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "gatehouse_unauthorized_total",
            "Total number of 401 responses."
        );
        "gatehouse_unauthorized_total"
    };

    // Latency metrics

    /// Histogram of logical call duration.
    pub static ref REQUEST_DURATION: &'static str = {
        metrics::describe_histogram!(
            "gatehouse_request_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of client calls in seconds, retries included."
        );
        "gatehouse_request_duration_seconds"
    };
    /// Histogram of single transport round trips.
    pub static ref DISPATCH_DURATION: &'static str = {
        metrics::describe_histogram!(
            "gatehouse_dispatch_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of transport round trips in seconds."
        );
        "gatehouse_dispatch_duration_seconds"
    };
}

/// Record metrics from a [`RequestContext`] after a client call.
///
/// When the `metrics` feature is disabled, this function is a no-op
/// and will be eliminated by the compiler.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_context_metrics(ctx: &RequestContext, method: &'static str, duration: Duration) {
    let status = ctx.status.as_str();
    let source = ctx.source.as_str();

    metrics::histogram!(
        *REQUEST_DURATION,
        "method" => method,
        "status" => status,
        "source" => source
    )
    .record(duration.as_secs_f64());

    match ctx.status {
        gatehouse_core::CacheStatus::Hit => {
            metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
        }
        gatehouse_core::CacheStatus::Miss => {
            metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
        }
        gatehouse_core::CacheStatus::Bypass => {}
    }

    if matches!(ctx.source, gatehouse_core::ResponseSource::InFlight) {
        metrics::counter!(*DEDUP_JOIN_COUNTER).increment(1);
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_context_metrics(_ctx: &RequestContext, _method: &'static str, _duration: Duration) {}

/// Record one transport round trip and its HTTP status (`None` on transport error).
#[cfg(feature = "metrics")]
#[inline]
pub fn record_dispatch(method: &'static str, status: Option<u16>, duration: Duration) {
    let status = status.map_or_else(|| "error".to_string(), |status| status.to_string());
    metrics::counter!(*DISPATCH_COUNTER, "method" => method, "status" => status).increment(1);
    metrics::histogram!(*DISPATCH_DURATION, "method" => method).record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_dispatch(_method: &'static str, _status: Option<u16>, _duration: Duration) {}

/// Record a rate-limit retry.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_rate_limit_retry() {
    metrics::counter!(*RATE_LIMIT_RETRY_COUNTER).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_rate_limit_retry() {}

/// Record an unauthorized response; `reset` tells whether the session was reset.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_unauthorized(reset: bool) {
    metrics::counter!(*UNAUTHORIZED_COUNTER, "reset" => if reset { "true" } else { "false" })
        .increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_unauthorized(_reset: bool) {}
