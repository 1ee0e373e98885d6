//! Candidate scoring with retry and fail-closed fallback.
//!
//! The search only sees the [`Scorer`] contract: one score in `[0.0, 1.0]`
//! per candidate, always. The raw external service is a [`GradingOracle`],
//! which may be rate limited, return garbage, or fail outright.
//! [`RetryingScorer`] bridges the two:
//!
//! - rate limiting is retried with linear backoff (20s, 40s, 60s)
//! - any other failure, an unparsable response, or running out of attempts
//!   yields `0.0` for every candidate
//!
//! so the search loop always makes progress.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{
    EXIT_RATE_LIMITED, FALLBACK_SCORE, RATE_LIMIT_MARKER, SCORER_BACKOFF_STEP,
    SCORER_MAX_ATTEMPTS,
};
use crate::error::OracleError;
use crate::generator::run_shell;

/// Scores a batch of candidate continuations of `context`.
///
/// Implementations must return exactly one score per candidate, aligned by
/// position, and must not fail.
pub trait Scorer {
    fn score(&self, context: &str, candidates: &[String]) -> Vec<f64>;
}

impl<S: Scorer + ?Sized> Scorer for &S {
    fn score(&self, context: &str, candidates: &[String]) -> Vec<f64> {
        (**self).score(context, candidates)
    }
}

/// The raw external grading service.
///
/// Returns the service's text response, expected to contain a bracketed
/// list of scores such as `[0.9, 0.4, 0.1]`.
pub trait GradingOracle {
    fn grade(&self, context: &str, candidates: &[String]) -> Result<String, OracleError>;
}

impl<F> GradingOracle for F
where
    F: Fn(&str, &[String]) -> Result<String, OracleError>,
{
    fn grade(&self, context: &str, candidates: &[String]) -> Result<String, OracleError> {
        self(context, candidates)
    }
}

// =============================================================================
// Response parsing
// =============================================================================

static BRACKETED_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid bracketed list regex"));

/// Parse the first bracketed list in `raw` into exactly `expected` scores.
///
/// Fails closed: returns `None` if there is no list, any entry is not a
/// finite number in `[0.0, 1.0]`, or the count differs from `expected`.
pub fn parse_scores(raw: &str, expected: usize) -> Option<Vec<f64>> {
    let inner = BRACKETED_LIST.captures(raw)?.get(1)?.as_str();

    let scores = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner
            .split(',')
            .map(|entry| {
                entry
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && (0.0..=1.0).contains(s))
            })
            .collect::<Option<Vec<f64>>>()?
    };

    (scores.len() == expected).then_some(scores)
}

// =============================================================================
// Retry adapter
// =============================================================================

/// How many times to call the oracle and how long to back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of oracle calls per scoring request
    pub max_attempts: u32,
    /// Attempt `k` (1-based) waits `k * backoff_step` after a rate limit
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: SCORER_MAX_ATTEMPTS,
            backoff_step: SCORER_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying after the given 1-based attempt was rate limited.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// [`Scorer`] over a [`GradingOracle`] with retry and zero-score fallback.
pub struct RetryingScorer<O> {
    oracle: O,
    policy: RetryPolicy,
    sleeper: Box<dyn Fn(Duration)>,
}

impl<O: GradingOracle> RetryingScorer<O> {
    /// Wrap `oracle` with the default retry policy.
    pub fn new(oracle: O) -> Self {
        Self::with_policy(oracle, RetryPolicy::default())
    }

    pub fn with_policy(oracle: O, policy: RetryPolicy) -> Self {
        Self {
            oracle,
            policy,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    fn fallback(candidates: &[String]) -> Vec<f64> {
        vec![FALLBACK_SCORE; candidates.len()]
    }
}

impl<O: GradingOracle> Scorer for RetryingScorer<O> {
    fn score(&self, context: &str, candidates: &[String]) -> Vec<f64> {
        if candidates.is_empty() {
            return Vec::new();
        }

        for attempt in 1..=self.policy.max_attempts {
            match self.oracle.grade(context, candidates) {
                Ok(raw) => {
                    debug!(attempt, response = %raw, "oracle response");
                    return parse_scores(&raw, candidates.len()).unwrap_or_else(|| {
                        warn!(
                            candidates = candidates.len(),
                            "unusable score list, falling back to zero scores"
                        );
                        Self::fallback(candidates)
                    });
                }
                Err(e) if e.is_retryable() => {
                    let wait = self.policy.backoff(attempt);
                    warn!(attempt, wait_secs = wait.as_secs_f64(), error = %e, "oracle rate limited");
                    (self.sleeper)(wait);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "oracle failed, falling back to zero scores");
                    return Self::fallback(candidates);
                }
            }
        }

        warn!(
            attempts = self.policy.max_attempts,
            "oracle retries exhausted, falling back to zero scores"
        );
        Self::fallback(candidates)
    }
}

// =============================================================================
// Command oracle
// =============================================================================

#[derive(Serialize)]
struct GradeRequest<'a> {
    context: &'a str,
    candidates: &'a [String],
}

/// Grading oracle backed by an external shell command.
///
/// The command receives `{"context": "...", "candidates": ["..."]}` on stdin
/// and prints its raw response on stdout. Exit status 75 or a stderr
/// mentioning `RESOURCE_EXHAUSTED` signals rate limiting.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    command: String,
}

impl CommandOracle {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl GradingOracle for CommandOracle {
    fn grade(&self, context: &str, candidates: &[String]) -> Result<String, OracleError> {
        let request = serde_json::to_vec(&GradeRequest {
            context,
            candidates,
        })
        .map_err(|e| OracleError::Failed(e.to_string()))?;

        let output =
            run_shell(&self.command, &request).map_err(|e| OracleError::Failed(e.to_string()))?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.code() == Some(EXIT_RATE_LIMITED) || stderr.contains(RATE_LIMIT_MARKER) {
            return Err(OracleError::RateLimited(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Err(OracleError::Failed(format!(
                "exit status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| OracleError::Malformed(e.to_string()))
    }
}
