//! Decision tree stored as a flat node arena
//!
//! Node 0 is the root. Split nodes reference their children by index into the
//! same vector, so a tree serializes as one ordered list.

/// Index of a node within its tree
pub type NodeId = u32;

/// Test applied at a split node; `true` sends the row left
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitCondition {
    /// `x <= threshold`
    LessOrEqual(f64),

    /// `x == code`, for features holding category codes
    Equals(f64),
}

impl SplitCondition {
    /// Whether `value` goes to the left child
    #[inline]
    pub fn goes_left(&self, value: f64) -> bool {
        match *self {
            Self::LessOrEqual(threshold) => value <= threshold,
            #[allow(clippy::float_cmp)]
            Self::Equals(code) => value == code,
        }
    }
}

/// A tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Internal node
    Split {
        /// Feature index tested
        feature: usize,
        /// Test applied to the feature
        condition: SplitCondition,
        /// Child taken when the test holds
        left: NodeId,
        /// Child taken otherwise
        right: NodeId,
    },

    /// Terminal node; the value already includes the learning rate
    Leaf {
        /// Contribution to the raw score
        value: f64,
    },
}

/// An immutable regression tree
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Wrap a node arena rooted at index 0
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// A single-leaf tree
    pub fn leaf(value: f64) -> Self {
        Self::new(vec![Node::Leaf { value }])
    }

    /// All nodes, root first
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Walk from the root to a leaf and return its value
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id as usize] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    condition,
                    left,
                    right,
                } => {
                    id = if condition.goes_left(row[*feature]) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}
