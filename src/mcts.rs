//! Monte Carlo Tree Search over text continuations.
//!
//! This module implements the search loop:
//! - UCT for child selection, with unvisited children ranked by their prior
//! - Batch expansion: one generator call and one scorer call per leaf
//! - Backpropagation of the expanded node's value to every ancestor
//!
//! There is no random rollout phase. The scorer's grade for a candidate
//! stands in for the simulation result and becomes the child's prior value.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::constants::{EXPLORATION_CONSTANT, FALLBACK_SCORE, N_ITERATIONS, ROOT_PRIOR};
use crate::error::GenerateError;
use crate::generator::{GenerationParams, Generator};
use crate::scorer::Scorer;
use crate::tree::{Node, NodeId, SearchTree};

/// Parameters for one search invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Number of select/expand/backpropagate iterations
    pub iterations: usize,
    /// Exploration constant `C` in the UCT formula
    pub exploration_constant: f64,
    /// Generator parameters; `samples` is the expansion batch size
    pub generation: GenerationParams,
    /// Optional wall-clock budget, checked before each iteration
    pub deadline: Option<Duration>,
    /// Initial value of the root node
    pub root_prior: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: N_ITERATIONS,
            exploration_constant: EXPLORATION_CONSTANT,
            generation: GenerationParams::default(),
            deadline: None,
            root_prior: ROOT_PRIOR,
        }
    }
}

/// Counters collected during a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    /// Iterations actually completed
    pub iterations: usize,
    /// Nodes created, excluding the root
    pub nodes_created: usize,
    /// Wall-clock time spent searching
    pub elapsed: Duration,
}

/// Outcome of a search: the whole tree plus the chosen node.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub tree: SearchTree,
    /// Most visited child of the root, or the root if it has no children
    pub best: NodeId,
    pub stats: SearchStats,
}

impl SearchResult {
    /// The chosen node.
    pub fn best_node(&self) -> &Node {
        self.tree.get(self.best)
    }

    /// Returns true if the search never got past the root.
    pub fn is_root(&self) -> bool {
        self.best == NodeId::ROOT
    }
}

/// Compute the UCT score of a visited child.
///
/// `value / visits + c * sqrt(ln(parent_visits) / visits)`
#[inline]
pub fn uct_score(child: &Node, parent_visits: u32, c: f64) -> f64 {
    let visits = f64::from(child.visits);
    let exploitation = child.value / visits;
    let exploration = c * (f64::from(parent_visits).ln() / visits).sqrt();
    exploitation + exploration
}

/// Return the first id with the strictly greatest key.
fn first_max_by<I, F>(ids: I, mut key: F) -> Option<NodeId>
where
    I: IntoIterator<Item = NodeId>,
    F: FnMut(NodeId) -> f64,
{
    let mut best: Option<(NodeId, f64)> = None;
    for id in ids {
        let k = key(id);
        match best {
            Some((_, best_k)) if k <= best_k => {}
            _ => best = Some((id, k)),
        }
    }
    best.map(|(id, _)| id)
}

/// Among the unvisited children of `id`, pick the one with the highest prior value.
pub fn select_unvisited(tree: &SearchTree, id: NodeId) -> Option<NodeId> {
    let unvisited = tree
        .children(id)
        .iter()
        .copied()
        .filter(|&c| tree.get(c).visits == 0);
    first_max_by(unvisited, |c| tree.get(c).value)
}

/// Choose which child of `id` to descend into.
///
/// Unvisited children come first (highest prior value wins). Once every child
/// has been visited, the child with the highest UCT score is chosen. Ties go
/// to the earliest child. Returns `None` if `id` has no children.
pub fn select_child(tree: &SearchTree, id: NodeId, c: f64) -> Option<NodeId> {
    if tree.get(id).is_leaf() {
        return None;
    }
    if let Some(child) = select_unvisited(tree, id) {
        return Some(child);
    }

    let parent_visits = tree.get(id).visits;
    first_max_by(tree.children(id).iter().copied(), |child| {
        uct_score(tree.get(child), parent_visits, c)
    })
}

/// A usable score is a finite number in `[0.0, 1.0]`.
#[inline]
fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=1.0).contains(&score)
}

/// Walk from the root to a leaf, following [`select_child`].
pub fn tree_descend(tree: &SearchTree, c: f64) -> NodeId {
    let mut node = NodeId::ROOT;
    while let Some(child) = select_child(tree, node, c) {
        node = child;
    }
    node
}

/// Expand `leaf` into scored children and return the node to backpropagate.
///
/// Terminal leaves are returned unchanged. Otherwise the generator is asked
/// for a batch of continuations, the scorer grades the whole batch at once,
/// and one child per candidate is attached with its score as prior value.
/// The returned node is the best-scored new child, or `leaf` itself if the
/// generator produced nothing.
pub fn expand<G, S>(
    tree: &mut SearchTree,
    leaf: NodeId,
    generator: &G,
    scorer: &S,
    params: &GenerationParams,
) -> Result<NodeId, GenerateError>
where
    G: Generator + ?Sized,
    S: Scorer + ?Sized,
{
    if tree.get(leaf).is_terminal || !tree.get(leaf).is_leaf() {
        return Ok(leaf);
    }

    let state = tree.get(leaf).state.clone();
    let candidates = generator.generate(&state, params)?;
    if candidates.is_empty() {
        warn!(leaf = leaf.index(), "generator returned no candidates");
        return Ok(leaf);
    }

    let mut scores = scorer.score(&state, &candidates);
    if scores.len() != candidates.len() {
        warn!(
            expected = candidates.len(),
            got = scores.len(),
            "scorer returned misaligned scores, using zero scores"
        );
        scores = vec![FALLBACK_SCORE; candidates.len()];
    } else if !scores.iter().all(|s| is_valid_score(*s)) {
        warn!(?scores, "scorer returned scores outside [0, 1], using zero scores");
        scores = vec![FALLBACK_SCORE; candidates.len()];
    }

    for (candidate, score) in candidates.iter().zip(scores) {
        // Steps are separated by a line break, as in the prompt format.
        tree.add_child(leaf, format!("\n{candidate}"), score);
    }
    debug!(
        leaf = leaf.index(),
        children = candidates.len(),
        "expanded leaf"
    );

    Ok(select_unvisited(tree, leaf).unwrap_or(leaf))
}

/// Run MCTS from `prompt` and return the chosen continuation.
///
/// Each iteration descends to a leaf, expands it, and backpropagates the
/// expanded node. The loop runs for `config.iterations` iterations, or until
/// `config.deadline` has elapsed. The best node is the root child with the
/// most visits (earliest on ties), or the root if nothing was expanded.
pub fn tree_search<G, S>(
    prompt: &str,
    generator: &G,
    scorer: &S,
    config: &SearchConfig,
) -> Result<SearchResult, GenerateError>
where
    G: Generator + ?Sized,
    S: Scorer + ?Sized,
{
    let start = Instant::now();
    let mut tree = SearchTree::with_prior(prompt, config.root_prior);
    let mut completed = 0;

    for i in 0..config.iterations {
        if config.deadline.is_some_and(|d| start.elapsed() >= d) {
            info!(completed = i, "search deadline reached");
            break;
        }

        let leaf = tree_descend(&tree, config.exploration_constant);
        let node = expand(&mut tree, leaf, generator, scorer, &config.generation)?;
        tree.backpropagate(node);
        completed += 1;

        debug!(
            iteration = i,
            leaf = leaf.index(),
            node = node.index(),
            depth = tree.depth(node),
            value = tree.get(node).value,
            "iteration complete"
        );
    }

    let best = best_child(&tree, NodeId::ROOT).unwrap_or(NodeId::ROOT);
    let stats = SearchStats {
        iterations: completed,
        nodes_created: tree.len() - 1,
        elapsed: start.elapsed(),
    };
    info!(
        iterations = stats.iterations,
        nodes = stats.nodes_created,
        best_visits = tree.get(best).visits,
        best_value = tree.get(best).value,
        "search finished"
    );
    dump_children(&tree, NodeId::ROOT);

    Ok(SearchResult { tree, best, stats })
}

/// Run a search with default parameters apart from the iteration count and batch size.
pub fn search<G, S>(
    prompt: &str,
    generator: &G,
    scorer: &S,
    max_iterations: usize,
    batch_size: usize,
) -> Result<SearchResult, GenerateError>
where
    G: Generator + ?Sized,
    S: Scorer + ?Sized,
{
    let config = SearchConfig {
        iterations: max_iterations,
        generation: GenerationParams {
            samples: batch_size,
            ..Default::default()
        },
        ..Default::default()
    };
    tree_search(prompt, generator, scorer, &config)
}

/// Find the most visited child of `id` (earliest on ties).
pub fn best_child(tree: &SearchTree, id: NodeId) -> Option<NodeId> {
    first_max_by(tree.children(id).iter().copied(), |c| {
        f64::from(tree.get(c).visits)
    })
}

/// Log statistics for the children of `id` at debug level.
pub fn dump_children(tree: &SearchTree, id: NodeId) {
    for &child in tree.children(id) {
        let node = tree.get(child);
        debug!(
            child = child.index(),
            visits = node.visits,
            value = node.value,
            mean = ?node.mean_value(),
            terminal = node.is_terminal,
            content = %node.content.trim(),
            "child"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;

    struct FixedScorer(Vec<f64>);

    impl Scorer for FixedScorer {
        fn score(&self, _context: &str, candidates: &[String]) -> Vec<f64> {
            self.0.iter().copied().cycle().take(candidates.len()).collect()
        }
    }

    fn greedy(samples: usize) -> GenerationParams {
        GenerationParams {
            samples,
            temperature: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_uct_score() {
        let mut tree = SearchTree::new("q");
        let a = tree.add_child(NodeId::ROOT, "a", 1.0);
        tree.backpropagate(a);
        tree.backpropagate(a);
        // value 1.0 over 2 visits, parent visits 2
        let expected = 0.5 + EXPLORATION_CONSTANT * (2f64.ln() / 2.0).sqrt();
        assert!((uct_score(tree.get(a), 2, EXPLORATION_CONSTANT) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_select_child_on_leaf_is_none() {
        let tree = SearchTree::new("q");
        assert_eq!(select_child(&tree, NodeId::ROOT, EXPLORATION_CONSTANT), None);
    }

    #[test]
    fn test_select_prefers_unvisited_by_value() {
        let mut tree = SearchTree::new("q");
        let a = tree.add_child(NodeId::ROOT, "a", 0.9);
        let b = tree.add_child(NodeId::ROOT, "b", 0.3);
        let c = tree.add_child(NodeId::ROOT, "c", 0.6);
        tree.backpropagate(a);

        // a is visited, so only b and c compete; c has the higher prior.
        assert_eq!(select_child(&tree, NodeId::ROOT, EXPLORATION_CONSTANT), Some(c));
        tree.backpropagate(c);
        assert_eq!(select_child(&tree, NodeId::ROOT, EXPLORATION_CONSTANT), Some(b));
    }

    #[test]
    fn test_select_ties_go_to_first() {
        let mut tree = SearchTree::new("q");
        let a = tree.add_child(NodeId::ROOT, "a", 0.5);
        let _b = tree.add_child(NodeId::ROOT, "b", 0.5);
        assert_eq!(select_child(&tree, NodeId::ROOT, EXPLORATION_CONSTANT), Some(a));
    }

    #[test]
    fn test_select_uses_uct_once_all_visited() {
        let mut tree = SearchTree::new("q");
        let a = tree.add_child(NodeId::ROOT, "a", 0.2);
        let b = tree.add_child(NodeId::ROOT, "b", 0.8);
        tree.backpropagate(a);
        tree.backpropagate(b);
        assert_eq!(select_child(&tree, NodeId::ROOT, EXPLORATION_CONSTANT), Some(b));

        // Pile visits on b so that a's exploration bonus dominates.
        for _ in 0..50 {
            tree.backpropagate(b);
        }
        assert_eq!(select_child(&tree, NodeId::ROOT, EXPLORATION_CONSTANT), Some(a));
    }

    #[test]
    fn test_expand_terminal_is_noop() {
        let mut tree = SearchTree::new("so \\boxed{4}");
        let generator = ScriptedGenerator::new(["never"]);
        let scorer = FixedScorer(vec![1.0]);

        let node = expand(&mut tree, NodeId::ROOT, &generator, &scorer, &greedy(3)).unwrap();
        assert_eq!(node, NodeId::ROOT);
        assert!(tree.root().is_leaf());
    }

    #[test]
    fn test_expand_attaches_scored_children() {
        let mut tree = SearchTree::new("Q:");
        let generator = ScriptedGenerator::new(["a", "b", "c"]);
        let scorer = FixedScorer(vec![0.1, 0.7, 0.4]);

        let node = expand(&mut tree, NodeId::ROOT, &generator, &scorer, &greedy(3)).unwrap();
        let children = tree.children(NodeId::ROOT).to_vec();

        assert_eq!(children.len(), 3);
        assert_eq!(node, children[1]);
        assert_eq!(tree.get(children[0]).state, "Q:\na");
        assert_eq!(tree.get(children[1]).value, 0.7);
        assert!(children.iter().all(|&c| tree.get(c).visits == 0));
    }

    #[test]
    fn test_expand_empty_batch_returns_leaf() {
        let mut tree = SearchTree::new("Q:");
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let scorer = FixedScorer(vec![0.5]);

        let node = expand(&mut tree, NodeId::ROOT, &generator, &scorer, &greedy(3)).unwrap();
        assert_eq!(node, NodeId::ROOT);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_expand_misaligned_scores_fall_back_to_zero() {
        struct ShortScorer;
        impl Scorer for ShortScorer {
            fn score(&self, _context: &str, _candidates: &[String]) -> Vec<f64> {
                vec![0.9]
            }
        }

        let mut tree = SearchTree::new("Q:");
        let generator = ScriptedGenerator::new(["a", "b"]);
        let node = expand(&mut tree, NodeId::ROOT, &generator, &ShortScorer, &greedy(2)).unwrap();

        assert_eq!(node, tree.children(NodeId::ROOT)[0]);
        assert!(tree.children(NodeId::ROOT).iter().all(|&c| tree.get(c).value == 0.0));
    }

    #[test]
    fn test_expand_rejects_out_of_range_scores() {
        let generator = ScriptedGenerator::new(["a", "b"]);

        for bad in [vec![0.9, f64::NAN], vec![0.2, -5.0], vec![1.5, 0.3]] {
            let mut tree = SearchTree::new("Q:");
            let scorer = FixedScorer(bad);
            let node = expand(&mut tree, NodeId::ROOT, &generator, &scorer, &greedy(2)).unwrap();

            let children = tree.children(NodeId::ROOT);
            assert_eq!(node, children[0]);
            assert!(children.iter().all(|&c| tree.get(c).value == 0.0));
        }
    }

    #[test]
    fn test_invalid_scores_keep_values_non_negative() {
        let generator = ScriptedGenerator::new(["a"]);
        let scorer = FixedScorer(vec![-5.0]);
        let config = SearchConfig {
            iterations: 3,
            generation: greedy(1),
            ..Default::default()
        };

        let result = tree_search("Q:", &generator, &scorer, &config).unwrap();
        assert_eq!(result.tree.root().value, 0.0);
        assert!(result.tree.iter().all(|(_, n)| n.value == 0.0));
    }

    #[test]
    fn test_root_prior_is_kept_and_accumulated() {
        let generator = ScriptedGenerator::new(["a"]);
        let scorer = FixedScorer(vec![0.25]);
        let config = SearchConfig {
            iterations: 2,
            generation: greedy(1),
            root_prior: 0.5,
            ..Default::default()
        };

        let result = tree_search("Q:", &generator, &scorer, &config).unwrap();
        // Iteration 1 backpropagates the first child (0.25). Iteration 2
        // expands it and backpropagates its child (0.25).
        assert_eq!(result.tree.root().value, 0.5 + 0.25 + 0.25);
        assert_eq!(result.tree.root().visits, 2);
    }

    #[test]
    fn test_single_iteration_scenario() {
        let generator = ScriptedGenerator::new(["\nThe answer is 4."]);
        let scorer = FixedScorer(vec![1.0]);
        let config = SearchConfig {
            iterations: 1,
            generation: greedy(1),
            ..Default::default()
        };

        let result = tree_search("Question: 2+2=?", &generator, &scorer, &config).unwrap();
        let children = result.tree.children(NodeId::ROOT);

        assert_eq!(children.len(), 1);
        assert_eq!(result.best, children[0]);
        assert_eq!(result.best_node().visits, 1);
        assert_eq!(result.best_node().value, 1.0);
        assert_eq!(result.best_node().state, "Question: 2+2=?\nThe answer is 4.");
        assert_eq!(result.tree.root().visits, 1);
        assert_eq!(result.stats.iterations, 1);
        assert_eq!(result.stats.nodes_created, 1);
    }

    #[test]
    fn test_zero_budget_returns_root() {
        let generator = ScriptedGenerator::new(["x"]);
        let scorer = FixedScorer(vec![1.0]);
        let result = search("q", &generator, &scorer, 0, 3).unwrap();
        assert!(result.is_root());
        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.stats.iterations, 0);
    }

    #[test]
    fn test_expired_deadline_stops_before_first_iteration() {
        let generator = ScriptedGenerator::new(["x"]);
        let scorer = FixedScorer(vec![1.0]);
        let config = SearchConfig {
            deadline: Some(Duration::ZERO),
            ..Default::default()
        };
        let result = tree_search("q", &generator, &scorer, &config).unwrap();
        assert!(result.is_root());
        assert_eq!(result.stats.iterations, 0);
    }

    #[test]
    fn test_terminal_root_is_revisited() {
        let generator = ScriptedGenerator::new(["x"]);
        let scorer = FixedScorer(vec![1.0]);
        let result = search("done \\boxed{1}", &generator, &scorer, 4, 3).unwrap();
        assert!(result.is_root());
        assert_eq!(result.tree.root().visits, 4);
        assert_eq!(result.tree.root().value, 0.0);
    }

    #[test]
    fn test_generator_failure_propagates() {
        struct Broken;
        impl Generator for Broken {
            fn generate(
                &self,
                _state: &str,
                params: &GenerationParams,
            ) -> Result<Vec<String>, GenerateError> {
                Err(GenerateError::BatchSize {
                    expected: params.samples,
                    got: 0,
                })
            }
        }

        let scorer = FixedScorer(vec![1.0]);
        let err = search("q", &Broken, &scorer, 3, 3).unwrap_err();
        assert!(matches!(err, GenerateError::BatchSize { .. }));
    }

    #[test]
    fn test_best_child_by_visits() {
        let mut tree = SearchTree::new("q");
        let a = tree.add_child(NodeId::ROOT, "a", 0.0);
        let b = tree.add_child(NodeId::ROOT, "b", 0.0);
        assert_eq!(best_child(&tree, NodeId::ROOT), Some(a));
        tree.backpropagate(b);
        assert_eq!(best_child(&tree, NodeId::ROOT), Some(b));
        assert_eq!(best_child(&tree, b), None);
    }
}
