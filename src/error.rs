//! Error types for Tollgate.
//!
//! A well-formed consume/inspect call never fails; a denial is a normal
//! outcome carried in a [`Decision`](crate::ratelimit::Decision). Errors only
//! come from configuration and from the surrounding CLI plumbing.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// A limiter was constructed with an unusable setting.
    #[error("Invalid limiter '{name}': {reason}")]
    InvalidLimiter { name: String, reason: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy name that is not part of the loaded policy set
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// The caller did not supply an identity the policy needs
    #[error("Policy '{policy}' requires an identity for dimension '{dimension}'")]
    MissingIdentity { policy: String, dimension: String },

    /// A request line that could not be parsed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
