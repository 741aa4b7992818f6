//! Per-key counter for one fixed window.

/// Requests counted for a key within its current window.
///
/// A bucket is created when a key is first seen (or first seen again after
/// its previous bucket expired) and lives until `reset_at`. An expired bucket
/// is replaced, never reset in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Requests seen in this window, including denied ones
    pub count: u64,
    /// Epoch millis at which this window ends
    pub reset_at: u64,
}

impl Bucket {
    /// Open a new window starting at `now`.
    pub fn new(now: u64, window_ms: u64) -> Self {
        Self {
            count: 0,
            reset_at: now.saturating_add(window_ms),
        }
    }

    /// A bucket is expired once the clock has moved strictly past `reset_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.reset_at
    }

    /// Record one attempt and return the new count.
    pub fn increment(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Whole seconds until the window resets, never less than one.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        let millis = self.reset_at.saturating_sub(now);
        millis.div_ceil(1000).max(1)
    }
}
