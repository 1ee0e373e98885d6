//! Error types for the search engine and its collaborators.

use thiserror::Error;

/// Errors raised by a [`crate::generator::Generator`].
///
/// These are never retried or masked by the search; they surface to the caller.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// The generator process could not be started or talked to.
    #[error("generator io error: {0}")]
    Io(#[from] std::io::Error),

    /// The generator process exited unsuccessfully.
    #[error("generator exited with status {status}: {stderr}")]
    Exit { status: i32, stderr: String },

    /// The generator output was not a JSON list of strings.
    #[error("generator returned undecodable output: {0}")]
    Decode(#[from] serde_json::Error),

    /// The generator returned a different number of continuations than requested.
    #[error("generator returned {got} continuations, expected {expected}")]
    BatchSize { expected: usize, got: usize },
}

/// Failures of the raw scoring oracle.
///
/// Only [`OracleError::RateLimited`] is retried; the scorer adapter absorbs
/// all of them into a zero score vector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The service reported exhausted quota or rate limiting.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The service answered but the response could not be used.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Any other failure.
    #[error("oracle failed: {0}")]
    Failed(String),
}

impl OracleError {
    /// Returns true if the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OracleError::RateLimited(_))
    }
}

/// Errors reading a benchmark dataset or writing its report.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}
