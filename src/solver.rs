//! Multi-step solution traces built from repeated searches.
//!
//! A single search picks one next step. The solver chains searches: the
//! chosen node's state becomes the next prompt, until the trace holds an
//! accepted final answer, stops making progress, or runs out of steps.

use std::time::{Duration, Instant};

use tracing::info;

use crate::constants::{ACCEPT_THRESHOLD, MAX_SOLVE_STEPS, STOP_PHRASES};
use crate::error::GenerateError;
use crate::generator::Generator;
use crate::mcts::{SearchConfig, tree_search};
use crate::scorer::Scorer;

/// Build the initial state for a question.
pub fn step_by_step_prompt(question: &str) -> String {
    format!(
        "Question: {question}\nLet's think step by step and output the final answer inside \\boxed{{}}."
    )
}

/// Parameters for a multi-step solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveConfig {
    /// Maximum number of searches chained together
    pub max_steps: usize,
    /// A terminal step with at least this accumulated value is accepted
    pub accept_threshold: f64,
    /// Step text containing any of these phrases ends the trace
    pub stop_phrases: Vec<String>,
    /// Parameters for each individual search
    pub search: SearchConfig,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            max_steps: MAX_SOLVE_STEPS,
            accept_threshold: ACCEPT_THRESHOLD,
            stop_phrases: STOP_PHRASES.iter().map(|s| s.to_string()).collect(),
            search: SearchConfig::default(),
        }
    }
}

/// Why a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A terminal step reached the acceptance threshold
    Accepted,
    /// A step announced its answer with a stop phrase
    StopPhrase,
    /// The search could not move past its root
    NoProgress,
    /// `max_steps` searches ran
    StepLimit,
}

/// One accepted step of the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStep {
    /// Text this step appended to the trace
    pub text: String,
    /// Visits of the chosen node (confidence proxy)
    pub visits: u32,
    /// Accumulated value of the chosen node
    pub value: f64,
    /// Whether the step holds a finalized answer
    pub terminal: bool,
}

/// Result of a multi-step solve.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// Full trace: the initial state followed by every step
    pub trace: String,
    pub steps: Vec<SolveStep>,
    pub stop: StopReason,
    pub elapsed: Duration,
}

impl SolveOutcome {
    /// Returns true if the trace ends with a finalized answer.
    pub fn is_solved(&self) -> bool {
        self.steps.last().is_some_and(|s| s.terminal)
    }
}

/// Solve from `initial_state` by chaining searches.
pub fn solve<G, S>(
    initial_state: &str,
    generator: &G,
    scorer: &S,
    config: &SolveConfig,
) -> Result<SolveOutcome, GenerateError>
where
    G: Generator + ?Sized,
    S: Scorer + ?Sized,
{
    let start = Instant::now();
    let mut trace = initial_state.to_string();
    let mut steps = Vec::new();
    let mut stop = StopReason::StepLimit;

    for step_num in 0..config.max_steps {
        let result = tree_search(&trace, generator, scorer, &config.search)?;
        if result.is_root() {
            stop = StopReason::NoProgress;
            break;
        }

        let best = result.best_node();
        let text = best.state[trace.len()..].to_string();
        info!(
            step = step_num + 1,
            visits = best.visits,
            value = best.value,
            text = %text.trim(),
            "step decided"
        );

        let step = SolveStep {
            text,
            visits: best.visits,
            value: best.value,
            terminal: best.is_terminal,
        };
        trace.clone_from(&best.state);

        let accepted = step.terminal && step.value >= config.accept_threshold;
        let announced = config
            .stop_phrases
            .iter()
            .any(|p| step.text.contains(p.as_str()));
        steps.push(step);

        if accepted {
            stop = StopReason::Accepted;
            break;
        }
        if announced {
            stop = StopReason::StopPhrase;
            break;
        }
    }

    Ok(SolveOutcome {
        trace,
        steps,
        stop,
        elapsed: start.elapsed(),
    })
}
