//! Serialized artifact schema
//!
//! An artifact is a typed dataflow graph: named input slots, an ordered list
//! of operations each reading earlier tensors and declaring its outputs, and
//! the names of the final outputs.
//!
//! Encoding rules:
//! - Every numeric value, including category codes, is an IEEE-754 binary64.
//! - Strings are UTF-8 and compared byte for byte. Text slots hold whole
//!   documents; tokenization happens inside `TokenizeAndCount`.
//! - A shape is a list of dimensions; `None` marks the dynamic batch
//!   dimension. Every tensor is two-dimensional, `[None, Some(width)]`.
//! - Under [`UnknownPolicy::Ignore`], an unseen category one-hot encodes to
//!   an all-zero row and ordinal encodes to the category count. Under
//!   [`UnknownPolicy::Error`] scoring fails.
//! - The schema holds only ordered sequences, never maps, so encodings are
//!   deterministic.

use serde::{Deserialize, Serialize};
use tabex_core::DataType;

/// Current artifact format version
pub const FORMAT_VERSION: u32 = 1;

/// Tensor shape; `None` is the dynamic batch dimension
pub type Shape = Vec<Option<usize>>;

/// Shape of a batch of `width`-wide rows
pub fn batch_shape(width: usize) -> Shape {
    vec![None, Some(width)]
}

/// A complete scoring graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Format version, [`FORMAT_VERSION`] when written
    pub format_version: u32,

    /// Who wrote the artifact
    pub producer: Producer,

    /// External inputs
    pub inputs: Vec<InputSlot>,

    /// Operations in execution order
    pub operations: Vec<Operation>,

    /// Final outputs, each naming an operation output
    pub outputs: Vec<TensorDecl>,
}

/// Writer identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    /// Producer name
    pub name: String,
    /// Producer version
    pub version: String,
}

impl Default for Producer {
    fn default() -> Self {
        Self {
            name: "tabex".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A named external input, one column per source column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSlot {
    /// Slot name
    pub name: String,

    /// Element type of every column
    pub element_type: DataType,

    /// Source column names, in slot column order
    pub columns: Vec<String>,

    /// `[None, Some(columns.len())]`
    pub shape: Shape,
}

/// A named tensor with its type and shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDecl {
    /// Tensor name
    pub name: String,
    /// Element type
    pub element_type: DataType,
    /// Shape
    pub shape: Shape,
}

impl TensorDecl {
    /// A `[None, Some(width)]` tensor
    pub fn batch(name: &str, element_type: DataType, width: usize) -> Self {
        Self {
            name: name.to_string(),
            element_type,
            shape: batch_shape(width),
        }
    }

    /// Declared width, if the shape is a batch of fixed-width rows
    pub fn width(&self) -> Option<usize> {
        match self.shape.as_slice() {
            [None, Some(width)] => Some(*width),
            _ => None,
        }
    }
}

/// One step of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Names of the tensors read, slots or earlier outputs
    pub inputs: Vec<String>,

    /// What the step computes
    pub kind: OpKind,

    /// Tensors written
    pub outputs: Vec<TensorDecl>,
}

/// Unknown-category policy recorded in encoding operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnknownPolicy {
    /// All-zero one-hot row, or the ordinal sentinel
    Ignore,
    /// Scoring fails
    Error,
}

/// Operation vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    /// Pick columns of the input by position
    SelectColumns {
        /// Column positions, in output order
        indices: Vec<usize>,
    },

    /// Copy a Float64 tensor unchanged
    Passthrough,

    /// One Utf8 column to one Float64 column per category
    OneHotEncode {
        /// Categories in output order
        categories: Vec<String>,
        /// Unknown-category policy
        handle_unknown: UnknownPolicy,
    },

    /// One Utf8 column to its category index
    OrdinalEncode {
        /// Categories in index order
        categories: Vec<String>,
        /// Unknown-category policy
        handle_unknown: UnknownPolicy,
    },

    /// One Utf8 column of documents to token counts
    TokenizeAndCount {
        /// Separator regular expression
        token_pattern: String,
        /// Keep letter case
        case_sensitive: bool,
        /// Tokens removed before counting
        stop_words: Vec<String>,
        /// Vocabulary in output order
        vocabulary: Vec<String>,
        /// Per-token weights applied to counts, if any
        idf: Option<Vec<f64>>,
    },

    /// Join Float64 tensors left-to-right
    Concatenate,

    /// `intercept + x · coefficients`
    LinearRegressor {
        /// Intercept
        intercept: f64,
        /// One coefficient per feature
        coefficients: Vec<f64>,
    },

    /// Naive Bayes class scores
    NaiveBayesClassifier {
        /// Class labels
        classes: Vec<String>,
        /// Training rows per class
        class_counts: Vec<f64>,
        /// Likelihood parameters per feature
        features: Vec<NaiveBayesInput>,
    },

    /// Sum of decision trees
    TreeEnsemble {
        /// Output transform
        objective: EnsembleObjective,
        /// Class labels, empty for regression
        classes: Vec<String>,
        /// Initial raw score per output
        base_scores: Vec<f64>,
        /// Trees in boosting order
        trees: Vec<TreeSpec>,
    },
}

impl OpKind {
    /// Short name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectColumns { .. } => "select_columns",
            Self::Passthrough => "passthrough",
            Self::OneHotEncode { .. } => "one_hot_encode",
            Self::OrdinalEncode { .. } => "ordinal_encode",
            Self::TokenizeAndCount { .. } => "tokenize_and_count",
            Self::Concatenate => "concatenate",
            Self::LinearRegressor { .. } => "linear_regressor",
            Self::NaiveBayesClassifier { .. } => "naive_bayes_classifier",
            Self::TreeEnsemble { .. } => "tree_ensemble",
        }
    }

    /// Whether this operation scores features rather than building them
    pub fn is_estimator(&self) -> bool {
        matches!(
            self,
            Self::LinearRegressor { .. }
                | Self::NaiveBayesClassifier { .. }
                | Self::TreeEnsemble { .. }
        )
    }

    /// Whether every numeric parameter is finite
    pub fn is_finite(&self) -> bool {
        let all = |values: &[f64]| values.iter().all(|v| v.is_finite());
        match self {
            Self::SelectColumns { .. }
            | Self::Passthrough
            | Self::OneHotEncode { .. }
            | Self::OrdinalEncode { .. }
            | Self::Concatenate => true,
            Self::TokenizeAndCount { idf, .. } => idf.as_deref().map_or(true, all),
            Self::LinearRegressor {
                intercept,
                coefficients,
            } => intercept.is_finite() && all(coefficients),
            Self::NaiveBayesClassifier {
                class_counts,
                features,
                ..
            } => {
                all(class_counts)
                    && features.iter().all(|feature| match feature {
                        NaiveBayesInput::Gaussian { means, variances } => {
                            all(means) && all(variances)
                        }
                        NaiveBayesInput::Categorical { probabilities } => {
                            probabilities.iter().all(|row| all(row))
                        }
                    })
            }
            Self::TreeEnsemble {
                base_scores, trees, ..
            } => {
                all(base_scores)
                    && trees.iter().flat_map(|t| &t.nodes).all(|node| match node {
                        TreeNode::Branch { value, .. } | TreeNode::Leaf { value } => {
                            value.is_finite()
                        }
                    })
            }
        }
    }
}

/// Likelihood parameters for one naive Bayes feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NaiveBayesInput {
    /// Normal distribution per class
    Gaussian {
        /// Mean per class
        means: Vec<f64>,
        /// Variance per class
        variances: Vec<f64>,
    },

    /// `probabilities[class][code]`
    Categorical {
        /// Probability table
        probabilities: Vec<Vec<f64>>,
    },
}

/// How tree ensemble raw scores become outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnsembleObjective {
    /// Raw score is the prediction
    Regression,
    /// Sigmoid of one raw score is the probability of `classes[1]`
    Logistic,
    /// Softmax over one raw score per class
    Softmax,
}

/// One tree and the raw-score column it adds to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    /// Output index
    pub class_index: usize,
    /// Node arena, root first
    pub nodes: Vec<TreeNode>,
}

/// A node in a tree arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Internal node; go left when the predicate holds
    Branch {
        /// Feature index
        feature: usize,
        /// Comparison
        predicate: Predicate,
        /// Threshold or category code
        value: f64,
        /// Left child index
        left: usize,
        /// Right child index
        right: usize,
    },

    /// Terminal node
    Leaf {
        /// Contribution to the raw score
        value: f64,
    },
}

/// Comparison applied at a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predicate {
    /// `x <= value`
    LessOrEqual,
    /// `x == value`
    Equal,
}

/// Reserved tensor names
pub mod names {
    /// Concatenated feature tensor
    pub const FEATURES: &str = "features";
    /// Regression output
    pub const PREDICTION: &str = "prediction";
    /// Classification label output
    pub const LABEL: &str = "label";
    /// Classification probability output
    pub const PROBABILITIES: &str = "probabilities";
}
