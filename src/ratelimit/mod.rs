//! Rate limiting logic and state management.

mod bucket;
mod clock;
mod combinator;
mod key;
mod limiter;
mod policy;
mod store;

pub use bucket::Bucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use combinator::{evaluate_all, inspect_all, most_restrictive, Check};
pub use key::{client_address, LimitKey};
pub use limiter::{
    Decision, LimiterConfig, RateLimiter, DEFAULT_MAX_BUCKETS, DEFAULT_SWEEP_INTERVAL_MS,
};
pub use policy::PolicySet;
pub use store::BucketStore;
