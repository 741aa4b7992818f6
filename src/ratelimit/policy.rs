//! Named limiters and compound policies built from configuration.
//!
//! A policy is a list of (limiter, dimension) checks. Evaluating it for a set
//! of caller identities keys each limiter by `dimension:value` and combines
//! the results with [`evaluate_all`].

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::clock::Clock;
use super::combinator::{evaluate_all, inspect_all, Check};
use super::key::LimitKey;
use super::limiter::{Decision, RateLimiter};
use crate::config::{PolicyCheckConfig, TollgateConfig};
use crate::error::{Result, TollgateError};

/// All limiters and policies of one configuration.
#[derive(Debug)]
pub struct PolicySet {
    limiters: BTreeMap<String, Arc<RateLimiter>>,
    policies: BTreeMap<String, Vec<PolicyCheckConfig>>,
}

impl PolicySet {
    /// Build every limiter up front and check every policy reference.
    ///
    /// Any invalid limiter or dangling reference fails the whole set.
    pub fn from_config(config: &TollgateConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut limiters = BTreeMap::new();
        for (name, limiter_config) in &config.limiters {
            let mut limiter_config = limiter_config.clone();
            limiter_config.name.get_or_insert_with(|| name.clone());
            let limiter = RateLimiter::with_clock(limiter_config, Arc::clone(&clock))?;
            limiters.insert(name.clone(), Arc::new(limiter));
        }

        for (policy, checks) in &config.policies {
            if checks.is_empty() {
                warn!(policy = %policy, "Policy has no checks and admits everything");
            }
            for check in checks {
                if !limiters.contains_key(&check.limiter) {
                    return Err(TollgateError::Config(format!(
                        "Policy '{}' references unknown limiter '{}'",
                        policy, check.limiter
                    )));
                }
                if check.dimension.is_empty() {
                    return Err(TollgateError::Config(format!(
                        "Policy '{}' has a check on '{}' with an empty dimension",
                        policy, check.limiter
                    )));
                }
            }
        }

        info!(
            limiters = limiters.len(),
            policies = config.policies.len(),
            "Policy set loaded"
        );

        Ok(Self {
            limiters,
            policies: config.policies.clone(),
        })
    }

    /// Charge every limiter of `policy` and return the combined decision.
    ///
    /// `identities` maps dimensions to values, e.g. `[("ip", "203.0.113.7")]`.
    /// Missing identities are reported before any limiter is charged.
    pub fn evaluate(&self, policy: &str, identities: &[(&str, &str)]) -> Result<Decision> {
        let resolved = self.resolve(policy, identities)?;
        let checks: Vec<Check<'_>> = resolved
            .iter()
            .map(|(limiter, key)| Check::new(limiter, key.as_str()))
            .collect();
        Ok(evaluate_all(&checks))
    }

    /// Combined decision for `policy` without charging any limiter.
    pub fn inspect(&self, policy: &str, identities: &[(&str, &str)]) -> Result<Decision> {
        let resolved = self.resolve(policy, identities)?;
        let checks: Vec<Check<'_>> = resolved
            .iter()
            .map(|(limiter, key)| Check::new(limiter, key.as_str()))
            .collect();
        Ok(inspect_all(&checks))
    }

    /// Look up a limiter by name.
    pub fn limiter(&self, name: &str) -> Option<&Arc<RateLimiter>> {
        self.limiters.get(name)
    }

    /// Policy names in sorted order.
    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    fn resolve(
        &self,
        policy: &str,
        identities: &[(&str, &str)],
    ) -> Result<Vec<(&RateLimiter, LimitKey)>> {
        let checks = self
            .policies
            .get(policy)
            .ok_or_else(|| TollgateError::UnknownPolicy(policy.to_string()))?;

        checks
            .iter()
            .map(|check| {
                let value = identities
                    .iter()
                    .find(|(dimension, _)| *dimension == check.dimension)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| TollgateError::MissingIdentity {
                        policy: policy.to_string(),
                        dimension: check.dimension.clone(),
                    })?;
                let limiter = self.limiters.get(&check.limiter).ok_or_else(|| {
                    TollgateError::Config(format!("Unknown limiter '{}'", check.limiter))
                })?;
                Ok((limiter.as_ref(), LimitKey::new(&check.dimension, value)))
            })
            .collect()
    }
}
