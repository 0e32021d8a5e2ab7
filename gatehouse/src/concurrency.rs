use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use gatehouse_core::RequestKey;
use thiserror::Error;
use tracing::{Instrument, debug, debug_span};

/// The dispatch task behind an in-flight entry did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConcurrencyError {
    /// The dispatch task panicked.
    #[error("in-flight request panicked")]
    Panicked,
    /// The dispatch task was aborted (runtime shutdown).
    #[error("in-flight request was cancelled")]
    Cancelled,
}

/// Shared handle to one in-flight dispatch.
pub type SharedFlight<T> = Shared<BoxFuture<'static, Result<T, ConcurrencyError>>>;

/// Result of registering a request with the [`InFlightRegistry`].
pub enum ConcurrencyDecision<T: Clone> {
    /// No request was in flight for the key; this caller started the dispatch.
    Proceed(SharedFlight<T>),
    /// A request was already in flight; this caller awaits its result.
    Await(SharedFlight<T>),
}

impl<T: Clone> ConcurrencyDecision<T> {
    /// Whether this caller joined an existing dispatch.
    pub fn is_await(&self) -> bool {
        matches!(self, ConcurrencyDecision::Await(_))
    }

    /// Returns the shared future, regardless of who started it.
    pub fn into_future(self) -> SharedFlight<T> {
        match self {
            ConcurrencyDecision::Proceed(flight) | ConcurrencyDecision::Await(flight) => flight,
        }
    }
}

struct Flight<T: Clone> {
    id: u64,
    epoch: u64,
    future: SharedFlight<T>,
}

type Flights<T> = DashMap<RequestKey, Flight<T>>;

/// Collapses concurrent identical reads into one network call (singleflight).
///
/// For a given [`RequestKey`] at most one dispatch is in flight. Every caller
/// that arrives while it is pending gets a clone of the same shared future
/// and observes the same outcome.
///
/// Flights are tagged with the caller's epoch. A caller never joins a flight
/// of a different epoch; it replaces the entry with a fresh dispatch and the
/// older flight settles unobserved by newcomers.
///
/// # Lifecycle
///
/// - The lookup and the insert happen under one shard lock of the map, with
///   no suspension point in between.
/// - The dispatch is spawned on its own tokio task as soon as it is
///   registered. It runs to completion even if every waiting caller goes
///   away, so [`dedupe`](Self::dedupe) must be called within a tokio runtime.
/// - The entry is removed by the dispatch task itself, before the task
///   yields its output. Waiters therefore resume only after the key is free
///   again, and a request issued after settlement starts a fresh dispatch.
pub struct InFlightRegistry<T: Clone> {
    flights: Arc<Flights<T>>,
    next_id: AtomicU64,
}

impl<T: Clone> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the in-flight dispatch for `key` started in the same `epoch`,
    /// or starts one with `factory`.
    ///
    /// `factory` is only invoked when no flight of `epoch` is pending for
    /// `key`.
    pub fn dedupe<F, Fut>(&self, key: &RequestKey, epoch: u64, factory: F) -> ConcurrencyDecision<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().epoch == epoch => {
                debug!(key = %key, "joining in-flight request");
                ConcurrencyDecision::Await(entry.get().future.clone())
            }
            Entry::Occupied(mut entry) => {
                debug!(key = %key, stale = entry.get().epoch, epoch, "superseding in-flight request");
                let flight = self.launch(key, epoch, factory);
                let future = flight.future.clone();
                entry.insert(flight);
                ConcurrencyDecision::Proceed(future)
            }
            Entry::Vacant(entry) => {
                let flight = self.launch(key, epoch, factory);
                let future = flight.future.clone();
                entry.insert(flight);
                ConcurrencyDecision::Proceed(future)
            }
        }
    }

    fn launch<F, Fut>(&self, key: &RequestKey, epoch: u64, factory: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            flights: Arc::downgrade(&self.flights),
            key: key.clone(),
            id,
        };
        let dispatch = factory();
        let span = debug_span!("gatehouse.flight", key = %key, id, epoch);
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                dispatch.await
            }
            .instrument(span),
        );
        let future = async move {
            task.await.map_err(|error| {
                if error.is_panic() {
                    ConcurrencyError::Panicked
                } else {
                    ConcurrencyError::Cancelled
                }
            })
        }
        .boxed()
        .shared();
        Flight { id, epoch, future }
    }

    /// Whether a dispatch is in flight for `key`.
    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.flights.contains_key(key)
    }

    /// Number of keys with a dispatch in flight.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// Removes a flight from the registry when its dispatch task ends.
///
/// Owned by the spawned task, so it drops on success, failure or panic.
struct FlightGuard<T: Clone> {
    flights: Weak<Flights<T>>,
    key: RequestKey,
    id: u64,
}

impl<T: Clone> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        if let Some(flights) = self.flights.upgrade() {
            // Only our own flight; a newer one may already own the key.
            let removed = flights.remove_if(&self.key, |_, flight| flight.id == self.id);
            drop(removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use gatehouse_core::QueryParams;

    fn explode() -> u8 {
        panic!("boom")
    }

    fn key(path: &str) -> RequestKey {
        RequestKey::from_parts("get", "https://api.campus.edu", path, &QueryParams::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_dispatch() {
        let registry = InFlightRegistry::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = key("/students");

        let decisions: Vec<_> = (0..5)
            .map(|_| {
                let calls = calls.clone();
                registry.dedupe(&key, 0, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    42
                })
            })
            .collect();

        assert!(!decisions[0].is_await());
        assert!(decisions[1..].iter().all(ConcurrencyDecision::is_await));
        assert_eq!(registry.len(), 1);

        let results =
            futures::future::join_all(decisions.into_iter().map(ConcurrencyDecision::into_future))
                .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| *result == Ok(42)));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_removed_before_waiters_resume() {
        let registry = Arc::new(InFlightRegistry::<&'static str>::new());
        let key = key("/rooms");

        let leader = registry.dedupe(&key, 0, || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "rooms"
        });
        let follower = registry.dedupe(&key, 0, || async { "never dispatched" });

        let observed = {
            let registry = registry.clone();
            let key = key.clone();
            async move {
                let value = follower.into_future().await;
                (value, registry.is_in_flight(&key))
            }
        };
        let (leader_value, (follower_value, still_in_flight)) =
            tokio::join!(leader.into_future(), observed);

        assert_eq!(leader_value, Ok("rooms"));
        assert_eq!(follower_value, Ok("rooms"));
        assert!(!still_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_after_settlement_dispatches_again() {
        let registry = InFlightRegistry::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = key("/courses");

        for expected in 1..=2 {
            let calls = calls.clone();
            let value = registry
                .dedupe(&key, 0, move || async move { calls.fetch_add(1, Ordering::SeqCst) + 1 })
                .into_future()
                .await;
            assert_eq!(value, Ok(expected));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_are_independent() {
        let registry = InFlightRegistry::<&'static str>::new();
        let a = registry.dedupe(&key("/a"), 0, || async { "a" });
        let b = registry.dedupe(&key("/b"), 0, || async { "b" });
        assert!(!a.is_await());
        assert!(!b.is_await());
        assert_eq!(registry.len(), 2);
        assert_eq!(a.into_future().await, Ok("a"));
        assert_eq!(b.into_future().await, Ok("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_survives_dropped_callers() {
        let registry = InFlightRegistry::<()>::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let key = key("/sessions");

        {
            let finished = finished.clone();
            let decision = registry.dedupe(&key, 0, move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
            // never polled
            drop(decision);
        }
        assert!(registry.is_in_flight(&key));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_dispatch_is_reported_and_cleared() {
        let registry = InFlightRegistry::<u8>::new();
        let key = key("/staff");

        let result = registry
            .dedupe(&key, 0, || async { explode() })
            .into_future()
            .await;

        assert_eq!(result, Err(ConcurrencyError::Panicked));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flights_of_another_epoch_are_not_joined() {
        let registry = InFlightRegistry::<&'static str>::new();
        let key = key("/me");

        let stale = registry.dedupe(&key, 1, || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            "alice"
        });
        let current = registry.dedupe(&key, 2, || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "bob"
        });
        let joined = registry.dedupe(&key, 2, || async { "never dispatched" });

        assert!(!current.is_await());
        assert!(joined.is_await());
        assert_eq!(registry.len(), 1);

        assert_eq!(current.into_future().await, Ok("bob"));
        assert_eq!(joined.into_future().await, Ok("bob"));
        assert_eq!(stale.into_future().await, Ok("alice"));
        assert!(registry.is_empty());
    }
}
