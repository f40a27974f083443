//! Rate limiting
//!
//! Fixed one-minute windows that reset on expiry, keyed by caller IP or client
//! identity. Two interchangeable backends implement [`RateLimiter`]:
//! - **Memory**: process-local, LRU-bounded counter map
//! - **Coordinated**: delegates to the counter service over HTTP (fail-closed)
//!
//! The counter service itself (the server side of the coordinated backend)
//! lives in [`service`].

pub mod coordinated;
pub mod memory;
pub mod service;

pub use coordinated::CoordinatedRateLimiter;
pub use memory::{LruCounterStore, MemoryRateLimiter};
pub use service::{CounterService, SqliteCounterStore, create_counter_routes};

use crate::constants::{DEFAULT_RATE_LIMIT_PER_MINUTE, MIN_RATE_LIMIT_PER_MINUTE, RATE_WINDOW_MS};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request count for one key within its current window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateCounter {
    pub key: String,
    pub count: u32,
    pub window_start_ms: i64,
}

impl RateCounter {
    /// First observation of `key`
    pub fn new(key: impl Into<String>, now_ms: i64) -> Self {
        Self {
            key: key.into(),
            count: 1,
            window_start_ms: now_ms,
        }
    }

    /// Whether the window that started at `window_start_ms` is over
    pub fn window_expired(&self, now_ms: i64) -> bool {
        now_ms - self.window_start_ms >= RATE_WINDOW_MS
    }

    /// Record one request and return the count within the current window
    ///
    /// The window restarts at count 1 once it is a full window old.
    pub fn consume(&mut self, now_ms: i64) -> u32 {
        if self.window_expired(now_ms) {
            self.count = 1;
            self.window_start_ms = now_ms;
        } else {
            self.count = self.count.saturating_add(1);
        }
        self.count
    }
}

/// Consume one request for `key` against `existing` state and report whether it is allowed
///
/// Shared by every backend so the window arithmetic lives in one place.
pub fn apply_check(
    existing: Option<RateCounter>,
    key: &str,
    limit_per_minute: u32,
    now_ms: i64,
) -> (RateCounter, bool) {
    let mut counter = match existing {
        Some(mut counter) => {
            counter.consume(now_ms);
            counter
        }
        None => RateCounter::new(key, now_ms),
    };
    if counter.key != key {
        counter.key = key.to_string();
    }
    let allowed = counter.count <= limit_per_minute;
    (counter, allowed)
}

/// Per-IP limit: the configured value, or the default when unset or below the floor
pub fn effective_limit(configured: Option<u32>) -> u32 {
    match configured {
        Some(limit) if limit >= MIN_RATE_LIMIT_PER_MINUTE => limit,
        _ => DEFAULT_RATE_LIMIT_PER_MINUTE,
    }
}

/// Per-client limit: half the IP limit, never below the floor
pub fn client_limit(ip_limit: u32) -> u32 {
    (ip_limit / 2).max(MIN_RATE_LIMIT_PER_MINUTE)
}

/// Check-and-consume rate limiting backend
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `key`; returns false when the key is over `limit_per_minute`
    async fn check_and_consume(&self, key: &str, limit_per_minute: u32) -> bool;

    /// Backend name for logs and metrics
    fn backend(&self) -> &'static str;
}

/// Synchronous counter store used by the in-memory backend
///
/// Callers serialize access; implementations need no interior locking.
pub trait CounterStore: Send {
    fn get(&mut self, key: &str) -> Option<RateCounter>;

    fn put(&mut self, counter: RateCounter);

    /// Drop counters whose window is over; returns how many were removed
    fn sweep_expired(&mut self, now_ms: i64) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
