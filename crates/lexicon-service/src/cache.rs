//! Fingerprint-keyed result cache with request coalescing
//!
//! At most one computation runs per fingerprint. Later callers for the same
//! fingerprint wait on the running computation instead of starting their
//! own. Computations run on spawned tasks, so a caller that gives up (drops
//! its future) does not cancel work other callers, or the cache, still want.
//!
//! Ready entries are evicted in strict LRU order once the capacity is
//! exceeded. Pending entries and entries that still have waiters are never
//! evicted.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use lexicon_core::{LexiconError, Result};

use crate::fingerprint::Fingerprint;

type Outcome<V> = Option<Result<V>>;

enum Slot<V> {
    Pending(watch::Receiver<Outcome<V>>),
    Ready(V),
}

struct Entry<V> {
    slot: Slot<V>,
    /// Tick at creation, tells a re-created entry apart from its predecessor
    generation: u64,
    /// Last access tick; only meaningful once ready
    tick: u64,
    /// Callers currently waiting on this entry
    waiters: usize,
}

struct Inner<V> {
    entries: HashMap<Fingerprint, Entry<V>>,
    /// Ready entries by access tick, oldest first
    lru: BTreeMap<u64, Fingerprint>,
    next_tick: u64,
    pending: usize,
}

impl<V> Inner<V> {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn ready_len(&self) -> usize {
        self.lru.len()
    }

    /// Evict least recently used ready entries without waiters until the
    /// ready count fits `capacity`. Returns the number evicted.
    fn evict(&mut self, capacity: usize) -> u64 {
        let mut evicted = 0;
        while self.ready_len() > capacity {
            let victim = self.lru.iter().find_map(|(tick, fingerprint)| {
                let entry = self.entries.get(fingerprint)?;
                (entry.waiters == 0).then_some(*tick)
            });
            let Some(tick) = victim else {
                break;
            };
            if let Some(fingerprint) = self.lru.remove(&tick) {
                debug!(fingerprint = fingerprint.short(), "Evicting cache entry");
                self.entries.remove(&fingerprint);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Cache statistics tracker
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
    failures: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses (computations started)
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total waits on an already running computation
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Get total evictions
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get total failed computations
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 - 1.0), coalesced waits count as hits
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits() + self.coalesced();
        let total = served + self.misses();
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    /// Ready entries currently cached
    pub entries: usize,
    /// Computations currently running
    pub in_flight: usize,
    /// Maximum number of ready entries
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub failures: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Coalescing LRU cache keyed by request fingerprint
pub struct CacheCoordinator<V> {
    inner: Arc<Mutex<Inner<V>>>,
    stats: Arc<CacheStats>,
    capacity: usize,
    max_in_flight: usize,
}

impl<V> Clone for CacheCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stats: Arc::clone(&self.stats),
            capacity: self.capacity,
            max_in_flight: self.max_in_flight,
        }
    }
}

impl<V> CacheCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, max_in_flight: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                lru: BTreeMap::new(),
                next_tick: 0,
                pending: 0,
            })),
            stats: Arc::new(CacheStats::default()),
            capacity,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Return the cached result for `fingerprint`, or compute it once
    ///
    /// `compute` is only called when no entry exists; it runs on a spawned
    /// task. Its error reaches every waiter and nothing is cached.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (mut receiver, generation) = {
            let mut guard = lock(&self.inner);
            let inner = &mut *guard;
            let tick = inner.tick();

            match inner.entries.get_mut(&fingerprint) {
                Some(entry) => match &entry.slot {
                    Slot::Ready(value) => {
                        let value = value.clone();
                        let previous = std::mem::replace(&mut entry.tick, tick);
                        inner.lru.remove(&previous);
                        inner.lru.insert(tick, fingerprint);
                        self.stats.record_hit();
                        return Ok(value);
                    }
                    Slot::Pending(receiver) => {
                        let receiver = receiver.clone();
                        entry.waiters += 1;
                        self.stats.record_coalesced();
                        (receiver, entry.generation)
                    }
                },
                None => {
                    if inner.pending >= self.max_in_flight {
                        return Err(LexiconError::Overloaded(format!(
                            "{} computations already in flight",
                            inner.pending
                        )));
                    }

                    let (sender, receiver) = watch::channel(None);
                    inner.entries.insert(
                        fingerprint.clone(),
                        Entry {
                            slot: Slot::Pending(receiver.clone()),
                            generation: tick,
                            tick,
                            waiters: 1,
                        },
                    );
                    inner.pending += 1;
                    self.stats.record_miss();
                    debug!(fingerprint = fingerprint.short(), "Starting computation");

                    let task = tokio::spawn(compute());
                    let coordinator = self.clone();
                    let key = fingerprint.clone();
                    tokio::spawn(async move {
                        let outcome = match task.await {
                            Ok(outcome) => outcome,
                            Err(e) => Err(LexiconError::CacheCompute(e.to_string())),
                        };
                        coordinator.complete(key, outcome, sender);
                    });
                    (receiver, tick)
                }
            }
        };

        let _guard = WaiterGuard {
            coordinator: self,
            fingerprint: &fingerprint,
            generation,
        };

        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(LexiconError::CacheCompute(
                "computation ended without a result".to_string(),
            ))
        })
    }

    /// Store the outcome and wake every waiter
    fn complete(&self, fingerprint: Fingerprint, outcome: Result<V>, sender: watch::Sender<Outcome<V>>) {
        {
            let mut inner = lock(&self.inner);
            inner.pending = inner.pending.saturating_sub(1);

            match &outcome {
                Ok(value) => {
                    let tick = inner.tick();
                    if let Some(entry) = inner.entries.get_mut(&fingerprint) {
                        entry.slot = Slot::Ready(value.clone());
                        entry.tick = tick;
                        inner.lru.insert(tick, fingerprint.clone());
                    }
                    let evicted = inner.evict(self.capacity);
                    self.stats.record_evictions(evicted);
                }
                Err(e) => {
                    inner.entries.remove(&fingerprint);
                    self.stats.record_failure();
                    warn!(fingerprint = fingerprint.short(), error = %e, "Computation failed");
                }
            }
        }
        sender.send_replace(Some(outcome));
    }

    fn release(&self, fingerprint: &Fingerprint, generation: u64) {
        let mut inner = lock(&self.inner);
        let Some(entry) = inner
            .entries
            .get_mut(fingerprint)
            .filter(|entry| entry.generation == generation)
        else {
            return;
        };
        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 && matches!(entry.slot, Slot::Ready(_)) {
            let evicted = inner.evict(self.capacity);
            self.stats.record_evictions(evicted);
        }
    }

    /// Whether a ready result is cached for `fingerprint`
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        matches!(
            lock(&self.inner).entries.get(fingerprint),
            Some(Entry {
                slot: Slot::Ready(_),
                ..
            })
        )
    }

    /// Number of ready entries
    pub fn len(&self) -> usize {
        lock(&self.inner).ready_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of running computations
    pub fn in_flight(&self) -> usize {
        lock(&self.inner).pending
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Generate a statistics report
    pub fn report(&self) -> CacheStatsReport {
        let (entries, in_flight) = {
            let inner = lock(&self.inner);
            (inner.ready_len(), inner.pending)
        };
        CacheStatsReport {
            entries,
            in_flight,
            capacity: self.capacity,
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            coalesced: self.stats.coalesced(),
            evictions: self.stats.evictions(),
            failures: self.stats.failures(),
            hit_rate: self.stats.hit_rate(),
        }
    }
}

/// Decrements the waiter count when a caller stops waiting, for any reason
struct WaiterGuard<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    coordinator: &'a CacheCoordinator<V>,
    fingerprint: &'a Fingerprint,
    generation: u64,
}

impl<V> Drop for WaiterGuard<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.coordinator
            .release(self.fingerprint, self.generation);
    }
}

/// Lock the shared state, recovering from poisoning
///
/// Critical sections never panic halfway through an update, so the state
/// behind a poisoned lock is still consistent.
fn lock<V>(inner: &Mutex<Inner<V>>) -> MutexGuard<'_, Inner<V>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
