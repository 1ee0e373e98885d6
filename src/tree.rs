//! Arena-backed search tree.
//!
//! Every node lives in a single `Vec` owned by [`SearchTree`] and is addressed
//! by a stable [`NodeId`]. Children are stored as ids on the parent, and each
//! node keeps its parent's id so backpropagation is an iterative walk to the
//! root rather than a chain of shared references.

use crate::answer::is_terminal;
use crate::constants::ROOT_PRIOR;

/// Stable index of a node inside a [`SearchTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root is always the first node of the arena.
    pub const ROOT: NodeId = NodeId(0);

    /// Returns the arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A node in the search tree: one point in the evolving solution text.
#[derive(Debug, Clone)]
pub struct Node {
    /// Full text from the root prompt through this node
    pub state: String,
    /// Text this node appended to its parent's state
    pub content: String,
    /// Sum of all scores propagated through this node (not an average)
    pub value: f64,
    /// Number of completed iterations whose path included this node
    pub visits: u32,
    /// Whether `state` already holds a finalized answer
    pub is_terminal: bool,
    /// Parent id (None for the root)
    pub parent: Option<NodeId>,
    /// Child ids in creation order
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(state: String, content: String, value: f64, parent: Option<NodeId>) -> Self {
        let is_terminal = is_terminal(&state);
        Self {
            state,
            content,
            value,
            visits: 0,
            is_terminal,
            parent,
            children: Vec::new(),
        }
    }

    /// Average value per visit, or `None` before the first visit.
    #[inline]
    pub fn mean_value(&self) -> Option<f64> {
        (self.visits > 0).then(|| self.value / f64::from(self.visits))
    }

    /// Returns true if the node has not been expanded.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The search tree for one search invocation.
#[derive(Debug, Clone)]
pub struct SearchTree {
    nodes: Vec<Node>,
}

impl SearchTree {
    /// Create a tree holding only a root for `state` with the default prior.
    pub fn new(state: impl Into<String>) -> Self {
        Self::with_prior(state, ROOT_PRIOR)
    }

    /// Create a tree whose root starts with the given prior value.
    pub fn with_prior(state: impl Into<String>, prior: f64) -> Self {
        let state = state.into();
        let root = Node::new(state.clone(), state, prior, None);
        Self { nodes: vec![root] }
    }

    /// The root node.
    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Borrow a node. Ids are only minted by this tree, so lookup cannot miss.
    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Child ids of `id`, in creation order.
    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Parent id of `id`, if any.
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds its root, so it is never empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes with their ids, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Attach a child to `parent` whose state is the parent's state followed by `content`.
    ///
    /// The child's value starts at `prior` and its terminal flag is computed
    /// from its own state.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is terminal; terminal nodes never gain children.
    pub fn add_child(&mut self, parent: NodeId, content: impl Into<String>, prior: f64) -> NodeId {
        let content = content.into();
        let parent_node = &self.nodes[parent.0];
        assert!(
            !parent_node.is_terminal,
            "attempted to add a child to terminal node {parent:?}"
        );
        let state = format!("{}{}", parent_node.state, content);

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(state, content, prior, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Propagate `id`'s value up to the root.
    ///
    /// `id` itself gains one visit but keeps its value; every ancestor gains
    /// one visit and adds `id`'s value to its own.
    pub fn backpropagate(&mut self, id: NodeId) {
        let score = self.nodes[id.0].value;
        self.nodes[id.0].visits += 1;

        let mut current = self.nodes[id.0].parent;
        while let Some(ancestor) = current {
            let node = &mut self.nodes[ancestor.0];
            node.value += score;
            node.visits += 1;
            current = node.parent;
        }
    }

    /// Number of edges between `id` and the root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(p) = current {
            depth += 1;
            current = self.parent(p);
        }
        depth
    }
}
