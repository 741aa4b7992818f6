//! Time sources for the rate limiter.
//!
//! All timestamps are Unix epoch milliseconds.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync + Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall clock backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // Pre-epoch wall time clamps to zero.
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Manually driven clock.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// limiter and advance another.
///
/// ```
/// use std::time::Duration;
/// use tollgate::ratelimit::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(Duration::from_secs(2));
/// assert_eq!(clock.now_millis(), 3_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.current.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, millis: u64) {
        self.current.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
