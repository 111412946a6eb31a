//! Gradient-boosted decision trees
//!
//! The objective follows from the targets: numeric targets train a squared
//! error regressor, two labels a logistic classifier, and more labels a
//! softmax classifier with one tree per class per round. Leaf values are
//! stored with the learning rate already applied, so scoring is a plain sum
//! of base score and leaf values.

mod builder;
pub mod tree;

use serde::{Deserialize, Serialize};
use tabex_core::{Error, FeatureMatrix, Result};
use tracing::{debug, info};

use crate::estimator::{check_width, encode_labels, sigmoid, softmax, FitOptions, Targets, Task};
use builder::{TreeBuilder, TreeParams};
pub use tree::{Node, NodeId, SplitCondition, Tree};

/// Probability clamp used when deriving a logistic base score
const PROBABILITY_EPSILON: f64 = 1e-15;

/// Gradient boosting options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Boosting rounds
    pub n_estimators: usize,

    /// Shrinkage applied to every leaf
    pub learning_rate: f64,

    /// Maximum tree depth
    pub max_depth: usize,

    /// Minimum rows per leaf
    pub min_samples_leaf: usize,

    /// L2 penalty on leaf values
    pub l2_regularization: f64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            l2_regularization: 0.0,
        }
    }
}

/// Loss the ensemble was trained on; also fixes the output transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Identity output
    SquaredError,
    /// Sigmoid over one raw score
    Logistic,
    /// Softmax over one raw score per class
    Softmax,
}

impl Objective {
    /// Number of raw scores per row
    pub fn n_outputs(self, n_classes: usize) -> usize {
        match self {
            Self::SquaredError | Self::Logistic => 1,
            Self::Softmax => n_classes,
        }
    }
}

/// A tree together with the raw-score column it adds to
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedTree {
    /// Output index (always 0 except for softmax)
    pub class_index: usize,
    /// The tree
    pub tree: Tree,
}

/// Fitted tree ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct FittedGradientBoosting {
    objective: Objective,
    classes: Vec<String>,
    base_scores: Vec<f64>,
    trees: Vec<BoostedTree>,
    n_features: usize,
}

impl FittedGradientBoosting {
    /// Build from known parameters
    pub fn from_parameters(
        objective: Objective,
        classes: Vec<String>,
        base_scores: Vec<f64>,
        trees: Vec<BoostedTree>,
        n_features: usize,
    ) -> Self {
        Self {
            objective,
            classes,
            base_scores,
            trees,
            n_features,
        }
    }

    /// Boost trees on the given targets
    pub fn fit(
        x: &FeatureMatrix,
        y: &Targets,
        options: &FitOptions,
        config: &GradientBoostingConfig,
    ) -> Result<Self> {
        if config.learning_rate <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "learning_rate must be positive, got {}",
                config.learning_rate
            )));
        }

        let n_rows = x.n_rows();
        let (objective, classes, targets) = match y {
            Targets::Numeric(values) => (Objective::SquaredError, Vec::new(), vec![values.clone()]),
            Targets::Labels(labels) => {
                let (classes, codes) = encode_labels(labels);
                if classes.len() < 2 {
                    return Err(Error::InvalidArgument(
                        "classification needs at least two classes".into(),
                    ));
                }
                let objective = if classes.len() == 2 {
                    Objective::Logistic
                } else {
                    Objective::Softmax
                };
                // One indicator vector per raw-score column
                let indicators = (0..objective.n_outputs(classes.len()))
                    .map(|k| {
                        let positive = if objective == Objective::Logistic { 1 } else { k };
                        codes
                            .iter()
                            .map(|&c| if c == positive { 1.0 } else { 0.0 })
                            .collect()
                    })
                    .collect();
                (objective, classes, indicators)
            }
        };

        let base_scores: Vec<f64> = targets
            .iter()
            .map(|t| base_score(objective, t))
            .collect();
        let n_outputs = base_scores.len();

        let mut categorical = vec![false; x.n_cols()];
        for &i in &options.categorical_features {
            categorical[i] = true;
        }

        let rows: Vec<&[f64]> = x.rows().collect();
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
            l2_regularization: config.l2_regularization,
            learning_rate: config.learning_rate,
        };

        // raw[k][i]: current score of row i for output k
        let mut raw: Vec<Vec<f64>> = base_scores.iter().map(|&b| vec![b; n_rows]).collect();
        let mut trees = Vec::with_capacity(config.n_estimators * n_outputs);
        let mut gradients = vec![0.0; n_rows];
        let mut hessians = vec![0.0; n_rows];

        for round in 0..config.n_estimators {
            let probabilities = (objective == Objective::Softmax).then(|| softmax_columns(&raw));

            for k in 0..n_outputs {
                for i in 0..n_rows {
                    let (g, h) = match objective {
                        Objective::SquaredError => (raw[k][i] - targets[k][i], 1.0),
                        Objective::Logistic => {
                            let p = sigmoid(raw[k][i]);
                            (p - targets[k][i], p * (1.0 - p))
                        }
                        Objective::Softmax => {
                            let p = probabilities.as_ref().map_or(0.0, |p| p[k][i]);
                            (p - targets[k][i], p * (1.0 - p))
                        }
                    };
                    gradients[i] = g;
                    hessians[i] = h;
                }

                let tree =
                    TreeBuilder::new(&rows, &categorical, &gradients, &hessians, params).build();
                for (i, row) in rows.iter().enumerate() {
                    raw[k][i] += tree.predict_row(row);
                }
                trees.push(BoostedTree {
                    class_index: k,
                    tree,
                });
            }

            if round % 10 == 0 {
                debug!(round, trees = trees.len(), "boosting round");
            }
        }

        info!(
            objective = ?objective,
            trees = trees.len(),
            features = x.n_cols(),
            "fitted gradient boosting"
        );

        Ok(Self {
            objective,
            classes,
            base_scores,
            trees,
            n_features: x.n_cols(),
        })
    }

    /// Training objective
    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// What this ensemble predicts
    pub fn task(&self) -> Task {
        match self.objective {
            Objective::SquaredError => Task::Regression,
            Objective::Logistic => Task::BinaryClassification,
            Objective::Softmax => Task::MulticlassClassification,
        }
    }

    /// Class labels, sorted; empty for regression
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Initial raw score per output
    pub fn base_scores(&self) -> &[f64] {
        &self.base_scores
    }

    /// Trees in boosting order
    pub fn trees(&self) -> &[BoostedTree] {
        &self.trees
    }

    /// Feature width expected at predict time
    pub fn n_features_in(&self) -> usize {
        self.n_features
    }

    /// Raw scores per row, one per output
    pub fn raw_scores(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>> {
        check_width(x, self.n_features)?;

        Ok(x
            .rows()
            .map(|row| {
                let mut scores = self.base_scores.clone();
                for boosted in &self.trees {
                    scores[boosted.class_index] += boosted.tree.predict_row(row);
                }
                scores
            })
            .collect())
    }

    /// Regression outputs
    pub fn predict_raw(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        if self.objective != Objective::SquaredError {
            return Err(Error::InvalidOperation(
                "raw predictions requested from a classifier".into(),
            ));
        }
        Ok(self.raw_scores(x)?.into_iter().map(|s| s[0]).collect())
    }

    /// Class probabilities per row
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>> {
        let scores = self.raw_scores(x)?;
        match self.objective {
            Objective::SquaredError => Err(Error::InvalidOperation(
                "predict_proba on a regression estimator".into(),
            )),
            Objective::Logistic => Ok(scores
                .into_iter()
                .map(|s| {
                    let p = sigmoid(s[0]);
                    vec![1.0 - p, p]
                })
                .collect()),
            Objective::Softmax => Ok(scores.iter().map(|s| softmax(s)).collect()),
        }
    }
}

fn base_score(objective: Objective, targets: &[f64]) -> f64 {
    let mean = targets.iter().sum::<f64>() / targets.len() as f64;
    match objective {
        Objective::SquaredError => mean,
        Objective::Logistic => {
            let p = mean.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
            (p / (1.0 - p)).ln()
        }
        Objective::Softmax => mean.max(PROBABILITY_EPSILON).ln(),
    }
}

/// Row-wise softmax over column-major scores
fn softmax_columns(raw: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n_rows = raw.first().map_or(0, Vec::len);
    let mut out = vec![vec![0.0; n_rows]; raw.len()];
    let mut scratch = vec![0.0; raw.len()];

    for i in 0..n_rows {
        for (k, column) in raw.iter().enumerate() {
            scratch[k] = column[i];
        }
        for (k, p) in softmax(&scratch).into_iter().enumerate() {
            out[k][i] = p;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::argmax;

    fn small() -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: 50,
            learning_rate: 0.3,
            max_depth: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_regression_fits_step() {
        let x = FeatureMatrix::from_column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = Targets::Numeric(vec![1.0, 1.0, 1.0, 5.0, 5.0, 5.0]);

        let fitted = FittedGradientBoosting::fit(&x, &y, &FitOptions::default(), &small()).unwrap();
        assert_eq!(fitted.task(), Task::Regression);

        let predictions = fitted
            .predict_raw(&FeatureMatrix::from_column(&[2.0, 5.0]))
            .unwrap();
        assert!((predictions[0] - 1.0).abs() < 1e-3);
        assert!((predictions[1] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_binary_classification() {
        let x = FeatureMatrix::from_column(&[1.0, 2.0, 3.0, 7.0, 8.0, 9.0]);
        let y = Targets::labels(["no", "no", "no", "yes", "yes", "yes"]);

        let fitted = FittedGradientBoosting::fit(&x, &y, &FitOptions::default(), &small()).unwrap();
        assert_eq!(fitted.objective(), Objective::Logistic);
        assert_eq!(fitted.classes(), &["no".to_string(), "yes".to_string()]);

        let proba = fitted
            .predict_proba(&FeatureMatrix::from_column(&[2.0, 8.0]))
            .unwrap();
        assert!(proba[0][0] > 0.9);
        assert!(proba[1][1] > 0.9);
        assert!(fitted.predict_raw(&FeatureMatrix::from_column(&[2.0])).is_err());
    }

    #[test]
    fn test_multiclass_on_categorical_codes() {
        let x = FeatureMatrix::from_column(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        let y = Targets::labels(["a", "a", "b", "b", "c", "c"]);
        let options = FitOptions {
            categorical_features: vec![0],
        };

        let fitted = FittedGradientBoosting::fit(&x, &y, &options, &small()).unwrap();
        assert_eq!(fitted.task(), Task::MulticlassClassification);
        assert_eq!(fitted.trees().len(), 150);
        assert!(fitted.trees().iter().all(|t| t.tree.nodes().iter().all(|n| match n {
            Node::Split { condition, .. } => matches!(condition, SplitCondition::Equals(_)),
            Node::Leaf { .. } => true,
        })));

        let proba = fitted
            .predict_proba(&FeatureMatrix::from_column(&[0.0, 1.0, 2.0]))
            .unwrap();
        for (row, expected) in proba.iter().zip([0, 1, 2]) {
            assert_eq!(argmax(row), expected);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = FeatureMatrix::from_column(&[1.0, 2.0]);
        let y = Targets::labels(["a", "a"]);

        assert!(matches!(
            FittedGradientBoosting::fit(&x, &y, &FitOptions::default(), &small()),
            Err(Error::InvalidArgument(_))
        ));
    }
}
