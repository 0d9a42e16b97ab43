//! Process-wide response cache keyed by `(chain, location, date)`.
//!
//! Entries expire after a fixed TTL and are removed by [`ResponseCache::sweep`].
//! Concurrent requests for the same key are coalesced: the first one fills
//! the entry, the others wait for it and read the result.

use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub chain: String,
    pub location: String,
    pub date: NaiveDate,
}

impl CacheKey {
    pub fn new(chain: &str, location: &str, date: NaiveDate) -> Self {
        Self {
            chain: chain.to_string(),
            location: location.to_string(),
            date,
        }
    }
}

/// A freshly computed value and whether it may be cached.
#[derive(Debug)]
pub struct Fill<V> {
    pub value: V,
    pub cacheable: bool,
}

pub struct ResponseCache<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<CacheKey, (V, Instant)>>,
    in_flight: Mutex<HashMap<CacheKey, Gate>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, stored_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(stored_at) < self.ttl
    }

    /// Cached value for `key` if it has not expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        let (value, stored_at) = entries.get(key)?;
        self.is_fresh(*stored_at, now).then(|| value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        let now = self.clock.now();
        self.entries.lock().insert(key, (value, now));
    }

    /// Number of stored entries, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, stored_at)| self.is_fresh(*stored_at, now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "cache sweep");
        }
        removed
    }

    /// Cached value for `key`, or the result of `fill`. Only one `fill` per
    /// key runs at a time; callers arriving meanwhile wait and then use the
    /// value it cached. Values with `cacheable == false` are returned but not
    /// stored.
    pub async fn get_or_fill<F, Fut, E>(&self, key: CacheKey, fill: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Fill<V>, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let gate = InFlight::join(&self.in_flight, key.clone());
        let _turn = gate.turn().await;
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let Fill { value, cacheable } = fill().await?;
        if cacheable {
            self.insert(key, value.clone());
        }
        Ok(value)
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// A caller's hold on the per-key gate. Dropping it, on any path including
/// cancellation, removes the gate once no other caller holds it.
struct InFlight<'a> {
    map: &'a Mutex<HashMap<CacheKey, Gate>>,
    key: CacheKey,
    gate: Option<Gate>,
}

impl<'a> InFlight<'a> {
    fn join(map: &'a Mutex<HashMap<CacheKey, Gate>>, key: CacheKey) -> Self {
        let gate = map.lock().entry(key.clone()).or_default().clone();
        Self {
            map,
            key,
            gate: Some(gate),
        }
    }

    async fn turn(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match self.gate {
            Some(ref gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Reference counts only change under the map lock, so the count seen
        // here is exact: one for the map, one for this holder.
        let mut map = self.map.lock();
        if let Some(gate) = self.gate.take() {
            if Arc::strong_count(&gate) <= 2 {
                map.remove(&self.key);
            }
            drop(gate);
        }
    }
}
