//! Fixed-window rate limiter.
//!
//! A key's window starts at its first request after being absent or expired
//! and lasts exactly `window_ms`. Because windows are fixed, up to twice
//! `max_requests` can be admitted across a window boundary.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace};

use super::bucket::Bucket;
use super::clock::{Clock, SystemClock};
use super::store::BucketStore;
use crate::error::{Result, TollgateError};

/// Default store capacity.
pub const DEFAULT_MAX_BUCKETS: usize = 10_000;
/// Default interval between sweeps of expired buckets.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Configuration for one limiter. Fixed for the limiter's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Label used in logs
    #[serde(default)]
    pub name: Option<String>,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per key per window
    pub max_requests: u64,
    /// Maximum number of buckets held at once
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
    /// Minimum time between sweeps of expired buckets
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_max_buckets() -> usize {
    DEFAULT_MAX_BUCKETS
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

impl LimiterConfig {
    /// Config with default capacity and sweep interval.
    pub fn new(window_ms: u64, max_requests: u64) -> Self {
        Self {
            name: None,
            window_ms,
            max_requests,
            max_buckets: DEFAULT_MAX_BUCKETS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_max_buckets(mut self, max_buckets: usize) -> Self {
        self.max_buckets = max_buckets;
        self
    }

    pub fn with_sweep_interval_ms(mut self, sweep_interval_ms: u64) -> Self {
        self.sweep_interval_ms = sweep_interval_ms;
        self
    }

    /// Reject settings that would silently disable or break limiting.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| TollgateError::InvalidLimiter {
            name: self.label().to_string(),
            reason: reason.to_string(),
        };

        if self.window_ms == 0 {
            return Err(invalid("window_ms must be positive"));
        }
        if self.max_requests == 0 {
            return Err(invalid("max_requests must be positive"));
        }
        if self.max_buckets == 0 {
            return Err(invalid("max_buckets must be positive"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(invalid("sweep_interval_ms must be positive"));
        }
        Ok(())
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

/// Outcome of a consume or inspect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the operation may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// Epoch millis at which the current window ends
    pub reset_at: u64,
    /// Seconds a denied caller should wait before retrying
    pub retry_after: u64,
}

impl Decision {
    /// The result of checking nothing: allowed with unbounded headroom.
    pub fn unbounded() -> Self {
        Self {
            allowed: true,
            remaining: u64::MAX,
            reset_at: 0,
            retry_after: 0,
        }
    }

    /// Value for a `Retry-After` header when the decision is a denial.
    pub fn retry_after_header(&self) -> Option<String> {
        (!self.allowed).then(|| self.retry_after.to_string())
    }
}

/// Keyed fixed-window rate limiter.
///
/// The limiter owns its bucket store; all access to it goes through
/// [`consume`](Self::consume) and [`inspect`](Self::inspect). Share a
/// limiter between tasks with `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    store: Mutex<BucketStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a limiter on the given clock. Fails if the config is invalid.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let store = BucketStore::new(
            config.window_ms,
            config.max_buckets,
            config.sweep_interval_ms,
            clock.now_millis(),
        );

        info!(
            limiter = %config.label(),
            window_ms = config.window_ms,
            max_requests = config.max_requests,
            max_buckets = config.max_buckets,
            "Rate limiter created"
        );

        Ok(Self {
            config,
            store: Mutex::new(store),
            clock,
        })
    }

    /// Spend one attempt for `key` and decide whether it is admitted.
    ///
    /// Denied attempts still count toward the window.
    pub fn consume(&self, key: &str) -> Decision {
        let now = self.clock.now_millis();

        let bucket = {
            let mut store = self.store.lock();
            store.maybe_sweep(now);
            let bucket = store.get_or_create(key, now);
            bucket.increment();
            *bucket
        };

        let decision = self.decide(&bucket, bucket.count <= self.config.max_requests, now);

        trace!(
            limiter = %self.config.label(),
            key = %key,
            count = bucket.count,
            allowed = decision.allowed,
            "Consumed"
        );
        if !decision.allowed {
            debug!(
                limiter = %self.config.label(),
                key = %key,
                retry_after = decision.retry_after,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Report what [`consume`](Self::consume) would decide right now, without
    /// spending an attempt or creating a bucket.
    pub fn inspect(&self, key: &str) -> Decision {
        let now = self.clock.now_millis();
        let bucket = self.store.lock().peek(key, now).copied();

        trace!(limiter = %self.config.label(), key = %key, "Inspected");

        match bucket {
            Some(bucket) => self.decide(&bucket, bucket.count < self.config.max_requests, now),
            None => Decision {
                allowed: true,
                remaining: self.config.max_requests,
                reset_at: now,
                retry_after: 0,
            },
        }
    }

    fn decide(&self, bucket: &Bucket, allowed: bool, now: u64) -> Decision {
        Decision {
            allowed,
            remaining: self.config.max_requests.saturating_sub(bucket.count),
            reset_at: bucket.reset_at,
            retry_after: bucket.retry_after_secs(now),
        }
    }

    /// The limiter's name, if it was given one.
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Number of buckets currently held, including not-yet-swept expired ones.
    pub fn bucket_count(&self) -> usize {
        self.store.lock().len()
    }
}
