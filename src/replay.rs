//! Line-oriented admission requests for the `tollgate` binary.
//!
//! Each input line is `<policy> <dimension>=<value> ...`. Blank lines and
//! lines starting with `#` are skipped. Every request produces one JSON line
//! on the output, either a decision or an error.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{Result, TollgateError};
use crate::ratelimit::{Decision, PolicySet};

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub policy: String,
    pub identities: Vec<(String, String)>,
}

impl Request {
    /// Parse one line. Returns `None` for blank lines and comments.
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut tokens = line.split_whitespace();
        let policy = tokens.next()?.to_string();

        let identities = tokens
            .map(|token| match token.split_once('=') {
                Some((dimension, value)) if !dimension.is_empty() && !value.is_empty() => {
                    Ok((dimension.to_string(), value.to_string()))
                }
                _ => Err(TollgateError::InvalidRequest(format!(
                    "Expected <dimension>=<value>, got '{}'",
                    token
                ))),
            })
            .collect::<Result<Vec<_>>>();

        Some(identities.map(|identities| Self { policy, identities }))
    }
}

/// One output line.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Decision {
        policy: String,
        allowed: bool,
        remaining: u64,
        reset_at: Option<String>,
        retry_after: Option<u64>,
    },
    Error {
        error: String,
    },
}

impl Outcome {
    fn decision(policy: &str, decision: &Decision) -> Self {
        let reset_at = i64::try_from(decision.reset_at)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));

        Outcome::Decision {
            policy: policy.to_string(),
            allowed: decision.allowed,
            remaining: decision.remaining,
            reset_at,
            retry_after: (!decision.allowed).then_some(decision.retry_after),
        }
    }
}

/// Counters for a finished replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub allowed: u64,
    pub denied: u64,
    pub errors: u64,
}

/// Evaluate one line against the policy set.
pub fn handle_line(policies: &PolicySet, line: &str) -> Option<Outcome> {
    let request = match Request::parse(line)? {
        Ok(request) => request,
        Err(e) => return Some(Outcome::Error { error: e.to_string() }),
    };

    let identities: Vec<(&str, &str)> = request
        .identities
        .iter()
        .map(|(dimension, value)| (dimension.as_str(), value.as_str()))
        .collect();

    Some(match policies.evaluate(&request.policy, &identities) {
        Ok(decision) => Outcome::decision(&request.policy, &decision),
        Err(e) => Outcome::Error { error: e.to_string() },
    })
}

/// Read requests until EOF and write one JSON line per request.
pub async fn run<R, W>(policies: &PolicySet, input: R, mut output: W) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let Some(outcome) = handle_line(policies, &line) else {
            continue;
        };

        match &outcome {
            Outcome::Decision { allowed: true, .. } => stats.allowed += 1,
            Outcome::Decision { .. } => stats.denied += 1,
            Outcome::Error { error } => {
                warn!(error = %error, "Rejected request line");
                stats.errors += 1;
            }
        }

        let mut encoded = serde_json::to_vec(&outcome)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
    }

    output.flush().await?;
    debug!(?stats, "Replay finished");
    Ok(stats)
}
