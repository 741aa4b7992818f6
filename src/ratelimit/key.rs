//! Limit keys and client address extraction.

use std::net::IpAddr;

/// Key identifying one rate budget, e.g. `ip:203.0.113.7`.
///
/// Composed of an identity dimension and its value so that the same value
/// under different dimensions never shares a budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey(String);

impl LimitKey {
    /// Create a key from a dimension and a value.
    pub fn new(dimension: &str, value: &str) -> Self {
        Self(format!("{}:{}", dimension, value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pick the client address for keying a request.
///
/// Uses the first entry of a comma-separated forwarded-address header
/// (`X-Forwarded-For`), trimmed, and falls back to the connection's peer
/// address when the header is absent or its first entry is empty.
pub fn client_address(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> Option<String> {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.to_string()))
}
