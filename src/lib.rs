//! Stepwise-MCTS: verifier-guided Monte Carlo Tree Search for step-by-step text generation.
//!
//! This crate interleaves a language-model sampler with an external scoring
//! oracle and uses MCTS to pick the most promising next step of a solution.
//! Instead of random rollouts, every candidate step is graded by the oracle
//! and that grade seeds the node's value.
//!
//! ## Modules
//!
//! - [`constants`] - Search, generation, and retry defaults
//! - [`tree`] - Arena-backed search tree
//! - [`mcts`] - Selection (UCT), expansion, backpropagation, and the search driver
//! - [`generator`] - Candidate continuation generators
//! - [`scorer`] - Scorer contract, oracle retry adapter, and score parsing
//! - [`answer`] - Finalized-answer detection and answer extraction
//! - [`solver`] - Multi-step traces built from repeated searches
//! - [`bench`] - Dataset benchmark against a zero-shot baseline
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```
//! use stepwise_mcts::generator::ScriptedGenerator;
//! use stepwise_mcts::mcts::search;
//! use stepwise_mcts::scorer::Scorer;
//!
//! struct Confident;
//!
//! impl Scorer for Confident {
//!     fn score(&self, _context: &str, candidates: &[String]) -> Vec<f64> {
//!         vec![1.0; candidates.len()]
//!     }
//! }
//!
//! let generator = ScriptedGenerator::new(["The answer is \\boxed{4}."]);
//!
//! // Run 5 iterations with 3 candidates per expansion
//! let result = search("Question: 2+2=?", &generator, &Confident, 5, 3).unwrap();
//! println!("Next step: {}", result.best_node().content.trim());
//! assert!(result.best_node().is_terminal);
//! ```

pub mod answer;
pub mod bench;
pub mod constants;
pub mod error;
pub mod generator;
pub mod mcts;
pub mod scorer;
pub mod solver;
pub mod tree;
