//! Request context types for tracking where a result came from.

/// Whether the response cache answered the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// Cache hit - a fresh entry was returned without touching the network.
    Hit,
    /// Cache miss - no fresh entry; the result came from a network call.
    #[default]
    Miss,
    /// The cache was not consulted (mutating call or per-call opt-out).
    Bypass,
}

impl CacheStatus {
    /// Returns the status as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        }
    }
}

/// Source of the result handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseSource {
    /// This call performed the network dispatch itself.
    #[default]
    Network,
    /// This call joined a dispatch already in flight for the same key.
    InFlight,
    /// The response cache answered the call.
    Cache,
}

impl ResponseSource {
    /// Returns the source as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::InFlight => "in_flight",
            ResponseSource::Cache => "cache",
        }
    }
}

/// Metadata about one completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestContext {
    /// Cache outcome.
    pub status: CacheStatus,
    /// Where the result came from.
    pub source: ResponseSource,
}

impl RequestContext {
    /// Context of a cache hit.
    pub const fn hit() -> Self {
        Self {
            status: CacheStatus::Hit,
            source: ResponseSource::Cache,
        }
    }

    /// Context of a call that reached (or joined) the network.
    pub const fn new(status: CacheStatus, source: ResponseSource) -> Self {
        Self { status, source }
    }
}
