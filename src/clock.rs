//! Time sources
//!
//! Every time-dependent component (replay cache, rate counters, OAuth state)
//! reads the current time through [`Clock`] so tests can drive time explicitly.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Wall-clock time source in Unix milliseconds
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Current time in whole seconds since the Unix epoch
    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// System clock backed by `chrono::Utc::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic tests
///
/// Clones share the same underlying time value.
///
/// ```
/// use weather_gateway::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance_secs(60);
/// assert_eq!(clock.now_millis(), 61_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start_millis`
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    /// Create a clock frozen at the current system time
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now_millis())
    }

    /// Advance the clock by `millis`
    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Advance the clock by `secs`
    pub fn advance_secs(&self, secs: i64) {
        self.advance_millis(secs * 1000);
    }

    /// Set the clock to an absolute time
    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Default production clock
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(5_000);
        let other = clock.clone();

        other.advance_secs(2);
        assert_eq!(clock.now_millis(), 7_000);
        assert_eq!(clock.now_secs(), 7);

        clock.set_millis(1_999);
        assert_eq!(other.now_secs(), 1);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
