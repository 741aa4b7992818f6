//! Tollgate - In-process Admission Control
//!
//! This crate decides, per identity key (client address, account, API token),
//! whether an operation may proceed within a fixed time window. Each
//! [`ratelimit::RateLimiter`] owns a memory-bounded bucket store, and several
//! limiters can be combined into one conservative decision for compound
//! policies such as "per address AND per account".
//!
//! State is local to the process. Horizontally scaled deployments get one
//! independent budget per instance.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod replay;
