//! Candidate continuation generators.
//!
//! A [`Generator`] turns a text state into a batch of candidate next steps.
//! The search treats it as an external collaborator: it is called once per
//! expansion and its failures are propagated, never retried.
//!
//! Two implementations ship with the crate:
//! - [`ScriptedGenerator`] - a fixed pool of continuations, deterministic at
//!   temperature 0 and seeded-random above it
//! - [`CommandGenerator`] - a shell command speaking JSON over stdin/stdout,
//!   used to plug in a real model server

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

use crate::constants::{EXPANSION_BATCH_SIZE, MAX_NEW_TOKENS, STOP_SEQUENCES, TEMPERATURE};
use crate::error::GenerateError;

/// Sampling parameters for one generator call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Number of continuations to return
    pub samples: usize,
    /// Upper bound on new tokens per continuation
    pub max_new_tokens: usize,
    /// Sampling temperature (0 = greedy)
    pub temperature: f64,
    /// Continuations are cut at the first occurrence of any of these
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            samples: EXPANSION_BATCH_SIZE,
            max_new_tokens: MAX_NEW_TOKENS,
            temperature: TEMPERATURE,
            stop_sequences: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Produces candidate continuations for a text state.
pub trait Generator {
    /// Return `params.samples` continuations of `state`, already trimmed and
    /// cut at the first stop sequence.
    fn generate(&self, state: &str, params: &GenerationParams)
    -> Result<Vec<String>, GenerateError>;
}

impl<G: Generator + ?Sized> Generator for &G {
    fn generate(
        &self,
        state: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, GenerateError> {
        (**self).generate(state, params)
    }
}

/// Cut `raw` at the earliest stop sequence and trim surrounding whitespace.
pub fn finish_continuation(raw: &str, stop_sequences: &[String]) -> String {
    let end = stop_sequences
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| raw.find(s.as_str()))
        .min()
        .unwrap_or(raw.len());
    raw[..end].trim().to_string()
}

// =============================================================================
// Scripted generator
// =============================================================================

/// In-process generator drawing from a fixed pool of continuations.
///
/// At temperature 0 it returns the first `samples` entries of the pool in
/// order (cycling if the pool is shorter). Above 0 it samples entries with a
/// seeded RNG, so runs are reproducible for a given seed.
pub struct ScriptedGenerator {
    pool: Vec<String>,
    rng: Mutex<fastrand::Rng>,
}

impl ScriptedGenerator {
    /// Create a generator over `pool` with a fixed default seed.
    pub fn new<I, S>(pool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_seed(pool, 0)
    }

    /// Create a generator over `pool` seeded with `seed`.
    pub fn with_seed<I, S>(pool: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pool: pool.into_iter().map(Into::into).collect(),
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }
}

impl Generator for ScriptedGenerator {
    fn generate(
        &self,
        _state: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, GenerateError> {
        if self.pool.is_empty() {
            return Ok(Vec::new());
        }

        let picks: Vec<usize> = if params.temperature > 0.0 {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            (0..params.samples)
                .map(|_| rng.usize(..self.pool.len()))
                .collect()
        } else {
            (0..params.samples).map(|i| i % self.pool.len()).collect()
        };

        Ok(picks
            .into_iter()
            .map(|i| finish_continuation(&self.pool[i], &params.stop_sequences))
            .collect())
    }
}

// =============================================================================
// Command generator
// =============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    state: &'a str,
    samples: usize,
    max_new_tokens: usize,
    temperature: f64,
    stop: &'a [String],
}

/// Generator backed by an external shell command.
///
/// The command receives a JSON object on stdin:
///
/// ```json
/// {"state": "...", "samples": 3, "max_new_tokens": 20, "temperature": 0.7, "stop": ["Question:"]}
/// ```
///
/// and must print a JSON array of exactly `samples` strings on stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
}

impl CommandGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Generator for CommandGenerator {
    fn generate(
        &self,
        state: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, GenerateError> {
        let request = serde_json::to_vec(&GenerateRequest {
            state,
            samples: params.samples,
            max_new_tokens: params.max_new_tokens,
            temperature: params.temperature,
            stop: &params.stop_sequences,
        })?;

        let output = run_shell(&self.command, &request)?;
        if !output.status.success() {
            return Err(GenerateError::Exit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let raw: Vec<String> = serde_json::from_slice(&output.stdout)?;
        if raw.len() != params.samples {
            return Err(GenerateError::BatchSize {
                expected: params.samples,
                got: raw.len(),
            });
        }
        debug!(command = %self.command, samples = raw.len(), "generated continuations");

        Ok(raw
            .iter()
            .map(|r| finish_continuation(r, &params.stop_sequences))
            .collect())
    }
}

/// Run `command` through `sh -c`, feeding `input` on stdin.
pub(crate) fn run_shell(command: &str, input: &[u8]) -> std::io::Result<std::process::Output> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        // A command that ignores its input may close stdin early.
        match stdin.write_all(input) {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
            _ => {}
        }
    }

    child.wait_with_output()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(samples: usize, temperature: f64) -> GenerationParams {
        GenerationParams {
            samples,
            temperature,
            ..Default::default()
        }
    }

    #[test]
    fn test_finish_continuation_cuts_at_earliest_stop() {
        let stops = vec!["Answer:".to_string(), "Question:".to_string()];
        let raw = "  7 * 3 = 21\nQuestion: next Answer: x";
        assert_eq!(finish_continuation(raw, &stops), "7 * 3 = 21");
    }

    #[test]
    fn test_finish_continuation_without_stop() {
        assert_eq!(finish_continuation("  x = 4 \n", &[]), "x = 4");
    }

    #[test]
    fn test_finish_continuation_ignores_empty_stop() {
        assert_eq!(finish_continuation("abc", &[String::new()]), "abc");
    }

    #[test]
    fn test_scripted_greedy_cycles_pool() {
        let generator = ScriptedGenerator::new(["a", "b"]);
        let out = generator.generate("s", &params(3, 0.0)).unwrap();
        assert_eq!(out, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_scripted_sampling_is_seeded() {
        let pool = ["one", "two", "three", "four"];
        let g1 = ScriptedGenerator::with_seed(pool, 7);
        let g2 = ScriptedGenerator::with_seed(pool, 7);
        let a = g1.generate("s", &params(5, 0.7)).unwrap();
        let b = g2.generate("s", &params(5, 0.7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.iter().all(|c| pool.contains(&c.as_str())));
    }

    #[test]
    fn test_scripted_applies_stop_sequences() {
        let generator = ScriptedGenerator::new(["  x = 2 Answer: junk"]);
        let out = generator.generate("s", &params(1, 0.0)).unwrap();
        assert_eq!(out, vec!["x = 2"]);
    }

    #[test]
    fn test_scripted_empty_pool() {
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        assert!(generator.generate("s", &params(3, 0.0)).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_reads_json_list() {
        let generator = CommandGenerator::new(r#"cat > /dev/null; echo '[" a ", "b Question: c"]'"#);
        let out = generator.generate("s", &params(2, 0.0)).unwrap();
        assert_eq!(out, vec!["a", "b"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_batch_size_mismatch() {
        let generator = CommandGenerator::new(r#"cat > /dev/null; echo '["a"]'"#);
        let err = generator.generate("s", &params(2, 0.0)).unwrap_err();
        assert!(matches!(err, GenerateError::BatchSize { expected: 2, got: 1 }));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_failure_propagates() {
        let generator = CommandGenerator::new("cat > /dev/null; echo boom >&2; exit 3");
        let err = generator.generate("s", &params(1, 0.0)).unwrap_err();
        match err {
            GenerateError::Exit { status, stderr } => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
