//! Generic TTL cache with single-flight fetch coordination.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::UpstreamError;

/// A stored value plus expiry and refresh bookkeeping.
struct StoredEntry<V> {
    value: V,
    expires_at: Instant,
    /// Bumped on every successful fetch or insert for this key. Lets callers
    /// detect whether the underlying data actually changed between reads.
    revision: u64,
}

type FlightOutput<V> = Result<(V, u64), UpstreamError>;
type Flight<V> = Shared<BoxFuture<'static, FlightOutput<V>>>;

/// A value served from the store.
#[derive(Debug, Clone)]
pub struct Cached<V> {
    pub value: V,
    /// Revision of the entry this value came from.
    pub revision: u64,
    /// True when the entry had expired and was served under the grace policy.
    pub stale: bool,
}

/// Key/value store with per-entry TTL and single-flight fetch coordination.
///
/// Concurrent `get_or_fetch` callers for the same key share one spawned
/// fetch task and all receive the same value or the same error. The fetch
/// runs as its own task, so a caller dropping its request does not cancel
/// the flight for the remaining waiters.
pub struct CacheStore<V> {
    entries: DashMap<String, StoredEntry<V>>,
    flights: Mutex<HashMap<String, Flight<V>>>,
    /// Deadline for a single flight, retries included. Waiters inherit it by
    /// awaiting the shared flight.
    fetch_timeout: Duration,
    /// How long past expiry an entry may still be served when the upstream
    /// fetch fails.
    stale_grace: Duration,
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new empty store.
    pub fn new(fetch_timeout: Duration, stale_grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            flights: Mutex::new(HashMap::new()),
            fetch_timeout,
            stale_grace,
        })
    }

    /// Get an unexpired value. An entry exactly at its expiry instant counts
    /// as expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.fresh(key).map(|cached| cached.value)
    }

    /// Store a value with the given TTL.
    pub fn insert(&self, key: &str, value: V, ttl: Duration) {
        self.store_value(key, value, ttl);
    }

    /// Remove an entry immediately.
    pub fn invalidate(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            debug!(key, "cache entry invalidated");
        }
    }

    /// Return the cached value for `key`, fetching it if absent or expired.
    ///
    /// If another flight for the same key is already in progress, awaits that
    /// flight instead of issuing a second upstream call. On fetch failure an
    /// expired entry still within the grace window is served with
    /// `stale: true`; otherwise the fetch error propagates.
    pub async fn get_or_fetch<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Cached<V>, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        if let Some(hit) = self.fresh(key) {
            return Ok(hit);
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            // Re-check under the lock: a flight that completed between the
            // fast path and here has already written the entry.
            if let Some(hit) = self.fresh(key) {
                return Ok(hit);
            }
            if let Some(flight) = flights.get(key) {
                debug!(key, "joining in-flight fetch");
                flight.clone()
            } else {
                let flight = self.spawn_flight(key.to_string(), ttl, fetch());
                flights.insert(key.to_string(), flight.clone());
                flight
            }
        };

        match flight.await {
            Ok((value, revision)) => Ok(Cached {
                value,
                revision,
                stale: false,
            }),
            Err(err) => {
                if let Some(stale) = self.stale_within_grace(key) {
                    warn!(key, error = %err, "fetch failed, serving stale entry within grace");
                    Ok(stale)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Fetch `key` unconditionally, joining an in-flight fetch if one exists.
    ///
    /// Used by time-based refresh: the previous entry stays in place until
    /// the fetch succeeds, so a failed refresh degrades to the stale-grace
    /// policy instead of evicting data.
    pub async fn refresh<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Cached<V>, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        let flight = {
            let mut flights = self.flights.lock().await;
            if let Some(flight) = flights.get(key) {
                flight.clone()
            } else {
                let flight = self.spawn_flight(key.to_string(), ttl, fetch());
                flights.insert(key.to_string(), flight.clone());
                flight
            }
        };

        flight.await.map(|(value, revision)| Cached {
            value,
            revision,
            stale: false,
        })
    }

    /// Spawn the fetch as its own task and wrap it in a shareable future.
    fn spawn_flight(
        self: &Arc<Self>,
        key: String,
        ttl: Duration,
        fetch: impl Future<Output = Result<V, UpstreamError>> + Send + 'static,
    ) -> Flight<V> {
        let store = Arc::clone(self);
        let deadline = self.fetch_timeout;
        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(deadline, fetch).await {
                Ok(Ok(value)) => {
                    let revision = store.store_value(&key, value.clone(), ttl);
                    debug!(key = %key, revision, "cache entry refreshed");
                    Ok((value, revision))
                }
                Ok(Err(err)) => Err(err),
                Err(_) => Err(UpstreamError::Timeout(format!(
                    "fetch deadline of {deadline:?} exceeded"
                ))),
            };
            store.flights.lock().await.remove(&key);
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(UpstreamError::Unavailable(format!(
                    "fetch task failed: {err}"
                ))),
            }
        }
        .boxed()
        .shared()
    }

    fn store_value(&self, key: &str, value: V, ttl: Duration) -> u64 {
        let expires_at = Instant::now() + ttl;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let revision = occupied.get().revision + 1;
                occupied.insert(StoredEntry {
                    value,
                    expires_at,
                    revision,
                });
                revision
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value,
                    expires_at,
                    revision: 1,
                });
                1
            }
        }
    }

    fn fresh(&self, key: &str) -> Option<Cached<V>> {
        let now = Instant::now();
        self.entries.get(key).and_then(|entry| {
            (entry.expires_at > now).then(|| Cached {
                value: entry.value.clone(),
                revision: entry.revision,
                stale: false,
            })
        })
    }

    fn stale_within_grace(&self, key: &str) -> Option<Cached<V>> {
        let now = Instant::now();
        self.entries.get(key).and_then(|entry| {
            (entry.expires_at + self.stale_grace > now).then(|| Cached {
                value: entry.value.clone(),
                revision: entry.revision,
                stale: true,
            })
        })
    }
}
