//! Process-local rate limiting
//!
//! Counters live in an LRU map bounded by `cacheCapacity`. The least recently
//! seen key is dropped when the map is full, so a flood of distinct keys can
//! not grow memory without bound.

use super::{CounterStore, RateCounter, RateLimiter, apply_check};
use crate::clock::SharedClock;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Run an expiry sweep every this many checks
const SWEEP_EVERY_CHECKS: u64 = 1024;

/// LRU-bounded [`CounterStore`]
pub struct LruCounterStore {
    entries: LruCache<String, RateCounter>,
}

impl LruCounterStore {
    /// Create a store holding at most `capacity` keys (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

impl CounterStore for LruCounterStore {
    fn get(&mut self, key: &str) -> Option<RateCounter> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, counter: RateCounter) {
        self.entries.put(counter.key.clone(), counter);
    }

    fn sweep_expired(&mut self, now_ms: i64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, counter)| counter.window_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct MemoryState {
    store: Box<dyn CounterStore>,
    checks: u64,
}

/// In-memory [`RateLimiter`]
///
/// Check-then-increment happens under one mutex, so concurrent requests for
/// the same key never both observe the last free slot.
pub struct MemoryRateLimiter {
    state: Mutex<MemoryState>,
    clock: SharedClock,
}

impl MemoryRateLimiter {
    /// Limiter backed by an [`LruCounterStore`] of `capacity` keys
    pub fn new(capacity: usize, clock: SharedClock) -> Self {
        Self::with_store(Box::new(LruCounterStore::new(capacity)), clock)
    }

    /// Limiter over an arbitrary store
    pub fn with_store(store: Box<dyn CounterStore>, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(MemoryState { store, checks: 0 }),
            clock,
        }
    }

    /// Synchronous check used by the async trait method
    pub fn check(&self, key: &str, limit_per_minute: u32) -> bool {
        let now_ms = self.clock.now_millis();
        let mut state = self.state.lock();

        state.checks = state.checks.wrapping_add(1);
        if state.checks % SWEEP_EVERY_CHECKS == 0 {
            let removed = state.store.sweep_expired(now_ms);
            if removed > 0 {
                tracing::debug!(removed, "Swept expired rate counters");
            }
        }

        let existing = state.store.get(key);
        let (counter, allowed) = apply_check(existing, key, limit_per_minute, now_ms);
        state.store.put(counter);
        allowed
    }

    /// Drop counters whose window is over
    pub fn sweep_expired(&self) -> usize {
        let now_ms = self.clock.now_millis();
        self.state.lock().store.sweep_expired(now_ms)
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.state.lock().store.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check_and_consume(&self, key: &str, limit_per_minute: u32) -> bool {
        self.check(key, limit_per_minute)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
