//! Short-lived in-memory response cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use gatehouse_core::{Payload, RequestKey};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// One cached response and the moment it was captured.
///
/// Entries are never mutated; a fresh fetch replaces the entry wholesale.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    payload: Payload,
    captured_at: Instant,
}

impl CacheEntry {
    fn new(payload: Payload, captured_at: Instant) -> Self {
        Self {
            payload,
            captured_at,
        }
    }

    /// Cached payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Monotonic capture time.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Whether the entry is younger than `ttl` at `now`.
    #[inline]
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.captured_at) < ttl
    }
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    touched: Instant,
}

/// Maps request keys to the last successful payload for a short time.
///
/// Freshness is checked on read: a stale entry reads as a miss and stays in
/// the map until it is overwritten, evicted or swept. Sweeping (see
/// [`ResponseCache::purge_expired`] and [`ResponseCache::spawn_sweeper`]) only
/// frees memory and never changes what [`ResponseCache::get`] returns.
///
/// # Capacity
///
/// Unbounded by default. With a capacity set, inserting a new key into a
/// full cache evicts the least recently used entry first (recency is the
/// last fresh read or write). The bound is soft under concurrent writers:
/// two racing inserts may briefly leave one entry over capacity.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gatehouse::cache::ResponseCache;
/// use gatehouse_core::{Payload, QueryParams, RequestKey};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = ResponseCache::new(Duration::from_secs(5));
/// let key = RequestKey::from_parts("get", "https://api.campus.edu", "/rooms", &QueryParams::new());
///
/// cache.put(key.clone(), Payload::new(serde_json::json!([])));
/// assert!(cache.get(&key).is_some());
/// # }
/// ```
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<RequestKey, Slot>,
    ttl: Duration,
    capacity: Option<NonZeroUsize>,
    /// Longest freshness window any reader asked for, in milliseconds.
    retention_ms: AtomicU64,
}

impl ResponseCache {
    /// Creates an unbounded cache with the given default TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: None,
            retention_ms: AtomicU64::new(duration_ms(ttl)),
        }
    }

    /// Creates a cache holding at most `capacity` entries.
    pub fn with_capacity(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(ttl)
        }
    }

    /// Default freshness window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Configured capacity, if bounded.
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.capacity
    }

    /// Returns the payload for `key` if it is fresh under the default TTL.
    pub fn get(&self, key: &RequestKey) -> Option<Payload> {
        self.get_with_ttl(key, self.ttl)
    }

    /// Returns the payload for `key` if it is fresh under `ttl`.
    pub fn get_with_ttl(&self, key: &RequestKey, ttl: Duration) -> Option<Payload> {
        self.retention_ms.fetch_max(duration_ms(ttl), Ordering::Relaxed);
        let now = Instant::now();
        let mut slot = self.entries.get_mut(key)?;
        if slot.entry.is_fresh(ttl, now) {
            slot.touched = now;
            Some(slot.entry.payload.clone())
        } else {
            trace!(key = %key, "cache entry is stale");
            None
        }
    }

    /// Returns the raw entry for `key`, fresh or not.
    pub fn entry(&self, key: &RequestKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Stores `payload` under `key`, replacing any previous entry.
    pub fn put(&self, key: RequestKey, payload: Payload) {
        self.put_if(key, payload, || true);
    }

    /// Stores `payload` under `key` only if `admit` returns `true`.
    ///
    /// `admit` runs while the key's shard is locked. [`clear`](Self::clear)
    /// locks every shard, so a condition flipped before a `clear` can never
    /// leave an entry behind. Returns whether the payload was stored.
    pub fn put_if(&self, key: RequestKey, payload: Payload, admit: impl FnOnce() -> bool) -> bool {
        if let Some(capacity) = self.capacity
            && !self.entries.contains_key(&key)
            && self.entries.len() >= capacity.get()
        {
            self.evict_lru();
        }
        let entry = self.entries.entry(key);
        if !admit() {
            trace!(key = %entry.key(), "cache write rejected");
            return false;
        }
        let now = Instant::now();
        entry.insert(Slot {
            entry: CacheEntry::new(payload, now),
            touched: now,
        });
        true
    }

    /// Removes the entry for `key`. Returns `true` if one existed.
    pub fn invalidate(&self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including stale ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries no reader could still consider fresh.
    ///
    /// Uses the longest TTL ever requested through
    /// [`get_with_ttl`](Self::get_with_ttl), so per-call TTL overrides keep
    /// their entries. Returns the number of removed entries.
    pub fn purge_expired(&self) -> usize {
        let retention = Duration::from_millis(self.retention_ms.load(Ordering::Relaxed));
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, slot| slot.entry.is_fresh(retention, now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    /// Spawns a task that calls [`purge_expired`](Self::purge_expired) every `interval`.
    ///
    /// The task holds a weak reference and exits once the cache is dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.purge_expired();
            }
        })
    }

    fn evict_lru(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|slot| slot.touched)
            .map(|slot| slot.key().clone());
        if let Some(key) = oldest {
            debug!(key = %key, "evicting least recently used cache entry");
            self.entries.remove(&key);
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
