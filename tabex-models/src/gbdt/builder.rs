//! Depth-wise tree growing on gradient statistics
//!
//! Splits are found by exact enumeration: numeric features try the midpoint
//! between every pair of adjacent distinct values, categorical features try
//! one-versus-rest on every code present in the node.

use super::tree::{Node, NodeId, SplitCondition, Tree};

/// Growth limits and regularization for a single tree
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub l2_regularization: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    condition: SplitCondition,
    gain: f64,
}

/// Grows one tree from per-row gradients and hessians
pub(crate) struct TreeBuilder<'a> {
    rows: &'a [&'a [f64]],
    categorical: &'a [bool],
    gradients: &'a [f64],
    hessians: &'a [f64],
    params: TreeParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        rows: &'a [&'a [f64]],
        categorical: &'a [bool],
        gradients: &'a [f64],
        hessians: &'a [f64],
        params: TreeParams,
    ) -> Self {
        Self {
            rows,
            categorical,
            gradients,
            hessians,
            params,
            nodes: Vec::new(),
        }
    }

    /// Grow a tree over every row
    pub fn build(mut self) -> Tree {
        let all: Vec<usize> = (0..self.rows.len()).collect();
        self.grow(&all, 0);
        Tree::new(self.nodes)
    }

    fn grow(&mut self, indices: &[usize], depth: usize) -> NodeId {
        let id = self.push(Node::Leaf { value: 0.0 });
        let (g, h) = self.sums(indices);

        let split = if depth < self.params.max_depth {
            self.best_split(indices, g, h)
        } else {
            None
        };

        match split {
            Some(candidate) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| candidate.condition.goes_left(self.rows[i][candidate.feature]));
                let left = self.grow(&left, depth + 1);
                let right = self.grow(&right, depth + 1);
                self.nodes[id as usize] = Node::Split {
                    feature: candidate.feature,
                    condition: candidate.condition,
                    left,
                    right,
                };
            }
            None => {
                self.nodes[id as usize] = Node::Leaf {
                    value: self.leaf_value(g, h),
                };
            }
        }
        id
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        #[allow(clippy::cast_possible_truncation)]
        let id = (self.nodes.len() - 1) as NodeId;
        id
    }

    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(g, h), &i| {
            (g + self.gradients[i], h + self.hessians[i])
        })
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denominator = h + self.params.l2_regularization;
        if denominator <= 0.0 {
            return 0.0;
        }
        g * g / denominator
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denominator = h + self.params.l2_regularization;
        if denominator <= 0.0 {
            return 0.0;
        }
        -self.params.learning_rate * g / denominator
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let min_leaf = self.params.min_samples_leaf.max(1);
        if indices.len() < 2 * min_leaf {
            return None;
        }

        let parent = self.score(g, h);
        let n_features = self.rows.first().map_or(0, |r| r.len());
        let mut best: Option<Candidate> = None;

        for feature in 0..n_features {
            let found = if self.categorical[feature] {
                self.best_categorical(indices, feature, g, h, parent, min_leaf)
            } else {
                self.best_numeric(indices, feature, g, h, parent, min_leaf)
            };
            if let Some(candidate) = found {
                if best.map_or(true, |b| candidate.gain > b.gain) {
                    best = Some(candidate);
                }
            }
        }

        best.filter(|b| b.gain > 1e-12)
    }

    fn best_numeric(
        &self,
        indices: &[usize],
        feature: usize,
        g: f64,
        h: f64,
        parent: f64,
        min_leaf: usize,
    ) -> Option<Candidate> {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

        let mut best: Option<Candidate> = None;
        let (mut gl, mut hl) = (0.0, 0.0);
        for (position, pair) in sorted.windows(2).enumerate() {
            gl += self.gradients[pair[0]];
            hl += self.hessians[pair[0]];

            let n_left = position + 1;
            let (lo, hi) = (self.rows[pair[0]][feature], self.rows[pair[1]][feature]);
            if lo >= hi || n_left < min_leaf || sorted.len() - n_left < min_leaf {
                continue;
            }

            let gain = self.score(gl, hl) + self.score(g - gl, h - hl) - parent;
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(Candidate {
                    feature,
                    condition: SplitCondition::LessOrEqual(lo / 2.0 + hi / 2.0),
                    gain,
                });
            }
        }
        best
    }

    fn best_categorical(
        &self,
        indices: &[usize],
        feature: usize,
        g: f64,
        h: f64,
        parent: f64,
        min_leaf: usize,
    ) -> Option<Candidate> {
        // (code, count, gradient sum, hessian sum), in first-seen order
        let mut stats: Vec<(f64, usize, f64, f64)> = Vec::new();
        for &i in indices {
            let code = self.rows[i][feature];
            #[allow(clippy::float_cmp)]
            let slot = match stats.iter().position(|s| s.0 == code) {
                Some(slot) => slot,
                None => {
                    stats.push((code, 0, 0.0, 0.0));
                    stats.len() - 1
                }
            };
            stats[slot].1 += 1;
            stats[slot].2 += self.gradients[i];
            stats[slot].3 += self.hessians[i];
        }
        stats.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut best: Option<Candidate> = None;
        for &(code, count, gl, hl) in &stats {
            if count < min_leaf || indices.len() - count < min_leaf {
                continue;
            }
            let gain = self.score(gl, hl) + self.score(g - gl, h - hl) - parent;
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(Candidate {
                    feature,
                    condition: SplitCondition::Equals(code),
                    gain,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_leaf: 1,
            l2_regularization: 0.0,
            learning_rate: 1.0,
        }
    }

    #[test]
    fn test_stump_splits_at_midpoint() {
        let data = [[1.0], [2.0], [3.0], [4.0]];
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        // Targets [0, 0, 10, 10] with zero predictions: g = -y, h = 1
        let gradients = [0.0, 0.0, -10.0, -10.0];
        let hessians = [1.0; 4];

        let tree = TreeBuilder::new(&rows, &[false], &gradients, &hessians, params(1)).build();

        assert_eq!(
            tree.nodes()[0],
            Node::Split {
                feature: 0,
                condition: SplitCondition::LessOrEqual(2.5),
                left: 1,
                right: 2,
            }
        );
        assert_eq!(tree.predict_row(&[1.5]), 0.0);
        assert_eq!(tree.predict_row(&[3.5]), 10.0);
    }

    #[test]
    fn test_midpoint_of_extreme_values_is_finite() {
        let data = [[-1e308], [-1e308], [1e308], [1e308]];
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let gradients = [0.0, 0.0, -10.0, -10.0];
        let hessians = [1.0; 4];

        let tree = TreeBuilder::new(&rows, &[false], &gradients, &hessians, params(1)).build();

        match &tree.nodes()[0] {
            Node::Split {
                condition: SplitCondition::LessOrEqual(threshold),
                ..
            } => assert!(threshold.is_finite()),
            other => panic!("expected split, got {other:?}"),
        }
        assert_eq!(tree.predict_row(&[-1e308]), 0.0);
        assert_eq!(tree.predict_row(&[1e308]), 10.0);
    }

    #[test]
    fn test_categorical_one_vs_rest() {
        let data = [[0.0], [1.0], [2.0], [1.0]];
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let gradients = [1.0, -5.0, 1.0, -5.0];
        let hessians = [1.0; 4];

        let tree = TreeBuilder::new(&rows, &[true], &gradients, &hessians, params(1)).build();

        match &tree.nodes()[0] {
            Node::Split { condition, .. } => assert_eq!(*condition, SplitCondition::Equals(1.0)),
            other => panic!("expected split, got {other:?}"),
        }
        assert_eq!(tree.predict_row(&[1.0]), 5.0);
        assert_eq!(tree.predict_row(&[0.0]), -1.0);
    }

    #[test]
    fn test_min_samples_leaf_blocks_split() {
        let data = [[1.0], [2.0], [3.0]];
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let gradients = [-1.0, -2.0, -3.0];
        let hessians = [1.0; 3];
        let params = TreeParams {
            min_samples_leaf: 2,
            ..params(3)
        };

        let tree = TreeBuilder::new(&rows, &[false], &gradients, &hessians, params).build();
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_row(&[1.0]), 2.0);
    }
}
