//! Compound policies: several limiters reduced to one decision.

use tracing::debug;

use super::limiter::{Decision, RateLimiter};

/// One limiter applied to one key.
#[derive(Debug, Clone, Copy)]
pub struct Check<'a> {
    pub limiter: &'a RateLimiter,
    pub key: &'a str,
}

impl<'a> Check<'a> {
    pub fn new(limiter: &'a RateLimiter, key: &'a str) -> Self {
        Self { limiter, key }
    }
}

/// Consume from every check and return the most restrictive result.
///
/// Every limiter is charged, even after one has already denied, so quota
/// cannot be spent on a lenient limiter while dodging a strict one. A denial
/// reports the longest `retry_after` among the denials; if all allow, the
/// smallest `remaining` wins. No checks at all is an unbounded pass.
pub fn evaluate_all(checks: &[Check<'_>]) -> Decision {
    let decisions: Vec<Decision> = checks
        .iter()
        .map(|check| check.limiter.consume(check.key))
        .collect();
    let combined = most_restrictive(&decisions);

    if !combined.allowed {
        debug!(
            checks = checks.len(),
            retry_after = combined.retry_after,
            "Compound policy denied"
        );
    }
    combined
}

/// Inspect every check without spending, reduced the same way as
/// [`evaluate_all`].
pub fn inspect_all(checks: &[Check<'_>]) -> Decision {
    let decisions: Vec<Decision> = checks
        .iter()
        .map(|check| check.limiter.inspect(check.key))
        .collect();
    most_restrictive(&decisions)
}

/// Reduce completed decisions. Ties keep the earliest decision.
pub fn most_restrictive(decisions: &[Decision]) -> Decision {
    let mut denied: Option<Decision> = None;
    let mut tightest: Option<Decision> = None;

    for decision in decisions {
        if decision.allowed {
            if tightest.map_or(true, |t| decision.remaining < t.remaining) {
                tightest = Some(*decision);
            }
        } else if denied.map_or(true, |d| decision.retry_after > d.retry_after) {
            denied = Some(*decision);
        }
    }

    denied.or(tightest).unwrap_or_else(Decision::unbounded)
}
