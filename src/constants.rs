//! Constants for search parameters, generation defaults, and scorer retries.
//!
//! This module contains the default configuration values for the engine.
//! Runtime structs such as [`crate::mcts::SearchConfig`] take their
//! `Default` values from here, and the CLI uses them as flag defaults.

use std::time::Duration;

// =============================================================================
// MCTS (Monte Carlo Tree Search) Parameters
// =============================================================================

/// Exploration constant `C` in the UCT formula (sqrt 2).
pub const EXPLORATION_CONSTANT: f64 = std::f64::consts::SQRT_2;

/// Default number of select/expand/backpropagate iterations per search.
pub const N_ITERATIONS: usize = 10;

/// Default number of candidate continuations requested per expansion.
pub const EXPANSION_BATCH_SIZE: usize = 3;

/// Prior value given to a freshly created root.
pub const ROOT_PRIOR: f64 = 0.0;

// =============================================================================
// Generation Parameters
// =============================================================================

/// Token budget for a single step continuation.
pub const MAX_NEW_TOKENS: usize = 20;

/// Sampling temperature for step continuations (non-zero for diversity).
pub const TEMPERATURE: f64 = 0.7;

/// Token budget for a zero-shot full solution in the benchmark.
pub const ZERO_SHOT_MAX_NEW_TOKENS: usize = 1024;

/// Generated text is cut at the first occurrence of any of these.
pub const STOP_SEQUENCES: [&str; 3] = ["Question:", "Answer:", "<|im_end|>"];

// =============================================================================
// Scorer Retry Policy
// =============================================================================

/// Maximum number of oracle calls per scoring request.
pub const SCORER_MAX_ATTEMPTS: u32 = 3;

/// Linear backoff step: attempt `k` waits `k * SCORER_BACKOFF_STEP`.
pub const SCORER_BACKOFF_STEP: Duration = Duration::from_secs(20);

/// Score assigned to every candidate when the oracle cannot be used.
pub const FALLBACK_SCORE: f64 = 0.0;

/// Process exit status a command oracle uses to signal rate limiting (EX_TEMPFAIL).
pub const EXIT_RATE_LIMITED: i32 = 75;

/// Marker a command oracle may print on stderr to signal rate limiting.
pub const RATE_LIMIT_MARKER: &str = "RESOURCE_EXHAUSTED";

// =============================================================================
// Multi-step Solving
// =============================================================================

/// Maximum number of searches chained into one solution trace.
pub const MAX_SOLVE_STEPS: usize = 10;

/// A terminal step with at least this accumulated value ends the trace.
pub const ACCEPT_THRESHOLD: f64 = 0.8;

/// Step text containing one of these phrases ends the trace.
pub const STOP_PHRASES: [&str; 1] = ["answer is"];

// =============================================================================
// Answer Grading
// =============================================================================

/// Maximum absolute difference for two numeric answers to count as equal.
pub const ANSWER_TOLERANCE: f64 = 1e-6;
