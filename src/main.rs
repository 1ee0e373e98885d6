//! Stepwise-MCTS: verifier-guided step-by-step solver.
//!
//! ## Usage
//!
//! - `stepwise-mcts` - Show a demo with scripted collaborators
//! - `stepwise-mcts search` - Pick one next step for a prompt
//! - `stepwise-mcts solve` - Build a full step-by-step solution trace
//! - `stepwise-mcts bench` - Compare zero-shot and search on a JSONL dataset
//!
//! The generator and scorer are external commands; see
//! [`CommandGenerator`] and [`CommandOracle`] for their stdin/stdout formats.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stepwise_mcts::bench::{BenchConfig, load_dataset, run_benchmark};
use stepwise_mcts::constants::{
    EXPANSION_BATCH_SIZE, EXPLORATION_CONSTANT, MAX_NEW_TOKENS, MAX_SOLVE_STEPS, N_ITERATIONS,
    ROOT_PRIOR, SCORER_BACKOFF_STEP, SCORER_MAX_ATTEMPTS, TEMPERATURE, ZERO_SHOT_MAX_NEW_TOKENS,
};
use stepwise_mcts::error::OracleError;
use stepwise_mcts::generator::{CommandGenerator, GenerationParams, ScriptedGenerator};
use stepwise_mcts::mcts::{SearchConfig, tree_search};
use stepwise_mcts::scorer::{CommandOracle, RetryPolicy, RetryingScorer};
use stepwise_mcts::solver::{SolveConfig, solve, step_by_step_prompt};

/// Stepwise-MCTS: verifier-guided Monte Carlo Tree Search for step-by-step solutions
#[derive(Parser)]
#[command(name = "stepwise-mcts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one search and print the chosen next step
    Search {
        /// Prompt (full text state) to continue
        #[arg(long)]
        prompt: String,
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        collaborators: CollaboratorArgs,
    },
    /// Chain searches into a full solution trace
    Solve {
        /// Question to solve
        #[arg(long)]
        question: String,
        #[command(flatten)]
        solve: SolveArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        collaborators: CollaboratorArgs,
    },
    /// Benchmark zero-shot generation against search on a JSONL dataset
    Bench {
        /// JSONL file of {"question", "answer"} records
        #[arg(long)]
        dataset: PathBuf,
        /// Where to write one JSON result line per record
        #[arg(long, default_value = "benchmark_results.jsonl")]
        output: PathBuf,
        /// Only use the first N records
        #[arg(long)]
        limit: Option<usize>,
        /// Token budget for the zero-shot baseline
        #[arg(long, default_value_t = ZERO_SHOT_MAX_NEW_TOKENS)]
        zero_shot_tokens: usize,
        #[command(flatten)]
        solve: SolveArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        collaborators: CollaboratorArgs,
    },
    /// Run a demo with scripted generator and scorer
    Demo,
}

#[derive(Args)]
struct SearchArgs {
    /// Iterations per search
    #[arg(long, default_value_t = N_ITERATIONS)]
    iterations: usize,
    /// Candidates per expansion
    #[arg(long, default_value_t = EXPANSION_BATCH_SIZE)]
    batch_size: usize,
    /// Token budget per candidate step
    #[arg(long, default_value_t = MAX_NEW_TOKENS)]
    max_new_tokens: usize,
    /// Sampling temperature
    #[arg(long, default_value_t = TEMPERATURE)]
    temperature: f64,
    /// UCT exploration constant
    #[arg(long, default_value_t = EXPLORATION_CONSTANT)]
    exploration: f64,
    /// Wall-clock budget per search, in seconds
    #[arg(long)]
    deadline_secs: Option<f64>,
    /// Initial value of the root node
    #[arg(long, default_value_t = ROOT_PRIOR)]
    root_prior: f64,
}

impl SearchArgs {
    fn to_config(&self) -> Result<SearchConfig> {
        let deadline = self
            .deadline_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("invalid --deadline-secs value {secs}"))
            })
            .transpose()?;

        Ok(SearchConfig {
            iterations: self.iterations,
            exploration_constant: self.exploration,
            generation: GenerationParams {
                samples: self.batch_size,
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature,
                ..Default::default()
            },
            deadline,
            root_prior: self.root_prior,
        })
    }
}

#[derive(Args)]
struct SolveArgs {
    /// Maximum number of chained searches
    #[arg(long, default_value_t = MAX_SOLVE_STEPS)]
    max_steps: usize,
    /// Accumulated value at which a final answer is accepted
    #[arg(long)]
    accept_threshold: Option<f64>,
}

impl SolveArgs {
    fn to_config(&self, search: SearchConfig) -> SolveConfig {
        let defaults = SolveConfig::default();
        SolveConfig {
            max_steps: self.max_steps,
            accept_threshold: self.accept_threshold.unwrap_or(defaults.accept_threshold),
            search,
            ..defaults
        }
    }
}

#[derive(Args)]
struct CollaboratorArgs {
    /// Shell command producing candidate steps (JSON in, JSON list out)
    #[arg(long)]
    generator_cmd: String,
    /// Shell command grading candidates (JSON in, bracketed score list out)
    #[arg(long)]
    scorer_cmd: String,
    /// Oracle attempts per scoring request
    #[arg(long, default_value_t = SCORER_MAX_ATTEMPTS)]
    scorer_attempts: u32,
    /// Linear backoff step after a rate limit, in seconds
    #[arg(long, default_value_t = SCORER_BACKOFF_STEP.as_secs())]
    scorer_backoff_secs: u64,
}

impl CollaboratorArgs {
    fn build(&self) -> (CommandGenerator, RetryingScorer<CommandOracle>) {
        let policy = RetryPolicy {
            max_attempts: self.scorer_attempts,
            backoff_step: Duration::from_secs(self.scorer_backoff_secs),
        };
        (
            CommandGenerator::new(&self.generator_cmd),
            RetryingScorer::with_policy(CommandOracle::new(&self.scorer_cmd), policy),
        )
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Search {
            prompt,
            search,
            collaborators,
        }) => {
            let (generator, scorer) = collaborators.build();
            let result = tree_search(&prompt, &generator, &scorer, &search.to_config()?)
                .context("search failed")?;
            let best = result.best_node();
            println!("{}", best.content.trim());
            println!(
                "visits={} value={:.3} terminal={}",
                best.visits, best.value, best.is_terminal
            );
        }
        Some(Commands::Solve {
            question,
            solve: solve_args,
            search,
            collaborators,
        }) => {
            let (generator, scorer) = collaborators.build();
            let config = solve_args.to_config(search.to_config()?);
            let outcome = solve(&step_by_step_prompt(&question), &generator, &scorer, &config)
                .context("solve failed")?;
            println!("{}", outcome.trace);
            println!(
                "steps={} stop={:?} time={:.2}s",
                outcome.steps.len(),
                outcome.stop,
                outcome.elapsed.as_secs_f64()
            );
        }
        Some(Commands::Bench {
            dataset,
            output,
            limit,
            zero_shot_tokens,
            solve: solve_args,
            search,
            collaborators,
        }) => {
            let (generator, scorer) = collaborators.build();
            let records = load_dataset(&dataset)
                .with_context(|| format!("failed to load {}", dataset.display()))?;
            let defaults = BenchConfig::default();
            let config = BenchConfig {
                limit,
                solve: solve_args.to_config(search.to_config()?),
                zero_shot: GenerationParams {
                    max_new_tokens: zero_shot_tokens,
                    ..defaults.zero_shot
                },
            };
            let report = BufWriter::new(
                File::create(&output)
                    .with_context(|| format!("failed to create {}", output.display()))?,
            );
            let summary = run_benchmark(&records, &generator, &scorer, &config, report)
                .context("benchmark failed")?;
            println!("Zero-shot accuracy: {:.3}", summary.zero_shot_accuracy());
            println!("MCTS accuracy: {:.3}", summary.mcts_accuracy());
        }
        Some(Commands::Demo) | None => run_demo()?,
    }

    Ok(())
}

/// Oracle for the demo: favors steps that carry the correct partial results.
fn demo_oracle(_context: &str, candidates: &[String]) -> Result<String, OracleError> {
    let scores: Vec<String> = candidates
        .iter()
        .map(|c| {
            if c.contains("185") {
                "0.1"
            } else if c.contains("195") || c.contains("150") {
                "0.9"
            } else {
                "0.5"
            }
        })
        .map(String::from)
        .collect();
    Ok(format!("[{}]", scores.join(", ")))
}

fn run_demo() -> Result<()> {
    println!("Stepwise-MCTS: verifier-guided step-by-step search\n");

    let generator = ScriptedGenerator::with_seed(
        [
            "15 * 13 = 15 * 10 + 15 * 3.",
            "15 * 10 = 150 and 15 * 3 = 45.",
            "150 + 45 = 195, so the answer is \\boxed{195}.",
            "15 * 13 = 185, so the answer is \\boxed{185}.",
        ],
        42,
    );
    let scorer = RetryingScorer::new(demo_oracle);

    println!("=== Single search ===");
    let prompt = step_by_step_prompt("What is 15 * 13?");
    let result = tree_search(&prompt, &generator, &scorer, &SearchConfig::default())?;
    let best = result.best_node();
    println!("Best step: {}", best.content.trim());
    println!(
        "Visits: {}  Value: {:.2}  Tree size: {}\n",
        best.visits,
        best.value,
        result.tree.len()
    );

    println!("=== Multi-step solve ===");
    let outcome = solve(&prompt, &generator, &scorer, &SolveConfig::default())?;
    println!("{}", outcome.trace);
    println!("Stopped: {:?} after {} steps", outcome.stop, outcome.steps.len());

    Ok(())
}
