//! Kernels for each operation kind
//!
//! These work from artifact parameters alone.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tabex_core::{Error, Result};

use super::tensor::Tensor;
use crate::artifact::{
    EnsembleObjective, NaiveBayesInput, OpKind, Predicate, TreeNode, TreeSpec, UnknownPolicy,
};

/// Compiled state an operation needs at run time
#[derive(Debug)]
pub(crate) enum Prepared {
    /// Nothing to precompute
    Plain,

    /// Category lookup and the source column it encodes
    Categories {
        column: String,
        lookup: HashMap<String, usize>,
    },

    /// Separator, stop words and vocabulary lookup
    Text {
        separator: Regex,
        stop_words: HashSet<String>,
        vocabulary: HashMap<String, usize>,
    },
}

impl Prepared {
    /// Precompile what `kind` needs; `source` names the column it reads
    pub fn new(kind: &OpKind, source: &str) -> Result<Self> {
        Ok(match kind {
            OpKind::OneHotEncode { categories, .. } | OpKind::OrdinalEncode { categories, .. } => {
                Self::Categories {
                    column: source.to_string(),
                    lookup: index(categories),
                }
            }
            OpKind::TokenizeAndCount {
                token_pattern,
                stop_words,
                vocabulary,
                ..
            } => Self::Text {
                separator: Regex::new(token_pattern).map_err(|e| {
                    Error::ArtifactCorrupt(format!("invalid token pattern: {e}"))
                })?,
                stop_words: stop_words.iter().cloned().collect(),
                vocabulary: index(vocabulary),
            },
            _ => Self::Plain,
        })
    }
}

fn index(values: &[String]) -> HashMap<String, usize> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (v.clone(), i))
        .collect()
}

/// Run one operation on its resolved inputs
pub(crate) fn execute(
    kind: &OpKind,
    prepared: &Prepared,
    inputs: &[&Tensor],
) -> Result<Vec<Tensor>> {
    match (kind, prepared) {
        (OpKind::SelectColumns { indices }, _) => Ok(vec![inputs[0].select_columns(indices)?]),
        (OpKind::Passthrough, _) => {
            inputs[0].as_f64()?;
            Ok(vec![inputs[0].clone()])
        }
        (
            OpKind::OneHotEncode {
                categories,
                handle_unknown,
            },
            Prepared::Categories { column, lookup },
        ) => {
            let lookup = Lookup {
                column,
                lookup,
                policy: *handle_unknown,
            };
            one_hot(inputs[0], categories.len(), &lookup)
        }
        (
            OpKind::OrdinalEncode {
                categories,
                handle_unknown,
            },
            Prepared::Categories { column, lookup },
        ) => {
            let lookup = Lookup {
                column,
                lookup,
                policy: *handle_unknown,
            };
            ordinal(inputs[0], categories.len(), &lookup)
        }
        (
            OpKind::TokenizeAndCount {
                case_sensitive,
                idf,
                ..
            },
            Prepared::Text {
                separator,
                stop_words,
                vocabulary,
            },
        ) => {
            let documents = inputs[0].as_utf8()?;
            let width = vocabulary.len();
            let mut data = vec![0.0; documents.len() * width];

            for (row, document) in documents.iter().enumerate() {
                let document = if *case_sensitive {
                    document.clone()
                } else {
                    document.to_lowercase()
                };
                for token in separator.split(&document) {
                    if token.is_empty() || stop_words.contains(token) {
                        continue;
                    }
                    if let Some(&j) = vocabulary.get(token) {
                        data[row * width + j] += 1.0;
                    }
                }
                if let Some(weights) = idf {
                    for (j, w) in weights.iter().enumerate() {
                        data[row * width + j] *= w;
                    }
                }
            }
            Ok(vec![Tensor::float64(documents.len(), width, data)?])
        }
        (OpKind::Concatenate, _) => Ok(vec![concatenate(inputs)?]),
        (
            OpKind::LinearRegressor {
                intercept,
                coefficients,
            },
            _,
        ) => {
            let x = inputs[0];
            let values = (0..x.n_rows())
                .map(|i| {
                    Ok(intercept
                        + x.f64_row(i)?
                            .iter()
                            .zip(coefficients)
                            .map(|(a, b)| a * b)
                            .sum::<f64>())
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(vec![Tensor::float64_column(values)])
        }
        (
            OpKind::NaiveBayesClassifier {
                classes,
                class_counts,
                features,
            },
            _,
        ) => {
            let x = inputs[0];
            let probabilities = (0..x.n_rows())
                .map(|i| {
                    let scores = naive_bayes_scores(x.f64_row(i)?, class_counts, features);
                    Ok(softmax(&scores))
                })
                .collect::<Result<Vec<_>>>()?;
            classification(classes, probabilities)
        }
        (
            OpKind::TreeEnsemble {
                objective,
                classes,
                base_scores,
                trees,
            },
            _,
        ) => {
            let x = inputs[0];
            let mut raw = Vec::with_capacity(x.n_rows());
            for i in 0..x.n_rows() {
                let row = x.f64_row(i)?;
                let mut scores = base_scores.clone();
                for tree in trees {
                    scores[tree.class_index] += evaluate_tree(tree, row)?;
                }
                raw.push(scores);
            }

            match objective {
                EnsembleObjective::Regression => Ok(vec![Tensor::float64_column(
                    raw.into_iter().map(|s| s[0]).collect(),
                )]),
                EnsembleObjective::Logistic => {
                    let probabilities = raw
                        .into_iter()
                        .map(|s| {
                            let p = 1.0 / (1.0 + (-s[0]).exp());
                            vec![1.0 - p, p]
                        })
                        .collect();
                    classification(classes, probabilities)
                }
                EnsembleObjective::Softmax => {
                    classification(classes, raw.iter().map(|s| softmax(s)).collect())
                }
            }
        }
        (kind, _) => Err(Error::ArtifactCorrupt(format!(
            "operation '{}' was not prepared",
            kind.name()
        ))),
    }
}

struct Lookup<'a> {
    column: &'a str,
    lookup: &'a HashMap<String, usize>,
    policy: UnknownPolicy,
}

impl Lookup<'_> {
    fn code(&self, value: &str) -> Result<Option<usize>> {
        match self.lookup.get(value) {
            Some(&code) => Ok(Some(code)),
            None => match self.policy {
                UnknownPolicy::Ignore => Ok(None),
                UnknownPolicy::Error => Err(Error::UnknownCategory {
                    column: self.column.to_string(),
                    value: value.to_string(),
                }),
            },
        }
    }
}

fn one_hot(input: &Tensor, width: usize, lookup: &Lookup<'_>) -> Result<Vec<Tensor>> {
    let values = input.as_utf8()?;
    let mut data = vec![0.0; values.len() * width];
    for (row, value) in values.iter().enumerate() {
        if let Some(code) = lookup.code(value)? {
            data[row * width + code] = 1.0;
        }
    }
    Ok(vec![Tensor::float64(values.len(), width, data)?])
}

fn ordinal(input: &Tensor, n_categories: usize, lookup: &Lookup<'_>) -> Result<Vec<Tensor>> {
    let values = input
        .as_utf8()?
        .iter()
        .map(|v| Ok(lookup.code(v)?.unwrap_or(n_categories) as f64))
        .collect::<Result<Vec<_>>>()?;
    Ok(vec![Tensor::float64_column(values)])
}

fn concatenate(inputs: &[&Tensor]) -> Result<Tensor> {
    let n_rows = inputs.first().map_or(0, |t| t.n_rows());
    if let Some(bad) = inputs.iter().find(|t| t.n_rows() != n_rows) {
        return Err(Error::shape(
            format!("{n_rows} rows"),
            format!("{} rows", bad.n_rows()),
        ));
    }

    let n_cols: usize = inputs.iter().map(|t| t.n_cols()).sum();
    let mut data = Vec::with_capacity(n_rows * n_cols);
    for i in 0..n_rows {
        for tensor in inputs {
            data.extend_from_slice(tensor.f64_row(i)?);
        }
    }
    Tensor::float64(n_rows, n_cols, data)
}

fn naive_bayes_scores(
    row: &[f64],
    class_counts: &[f64],
    features: &[NaiveBayesInput],
) -> Vec<f64> {
    let total: f64 = class_counts.iter().sum();
    class_counts
        .iter()
        .enumerate()
        .map(|(c, &count)| {
            let mut score = (count / total).ln();
            for (feature, &x) in features.iter().zip(row) {
                match feature {
                    NaiveBayesInput::Gaussian { means, variances } => {
                        let variance = variances[c];
                        let diff = x - means[c];
                        score += -0.5 * (2.0 * std::f64::consts::PI * variance).ln()
                            - diff * diff / (2.0 * variance);
                    }
                    NaiveBayesInput::Categorical { probabilities } => {
                        let table = &probabilities[c];
                        // Codes outside the table are unknown categories
                        if x >= 0.0 && x.fract() == 0.0 && x < table.len() as f64 {
                            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                            let code = x as usize;
                            score += table[code].ln();
                        }
                    }
                }
            }
            score
        })
        .collect()
}

fn evaluate_tree(tree: &TreeSpec, row: &[f64]) -> Result<f64> {
    let mut id = 0;
    // A valid tree reaches a leaf in fewer steps than it has nodes
    for _ in 0..=tree.nodes.len() {
        match tree.nodes.get(id) {
            Some(TreeNode::Leaf { value }) => return Ok(*value),
            Some(TreeNode::Branch {
                feature,
                predicate,
                value,
                left,
                right,
            }) => {
                let x = row[*feature];
                #[allow(clippy::float_cmp)]
                let goes_left = match predicate {
                    Predicate::LessOrEqual => x <= *value,
                    Predicate::Equal => x == *value,
                };
                id = if goes_left { *left } else { *right };
            }
            None => break,
        }
    }
    Err(Error::ArtifactCorrupt("tree does not terminate in a leaf".into()))
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Label (first maximum wins) and probability tensors
fn classification(classes: &[String], probabilities: Vec<Vec<f64>>) -> Result<Vec<Tensor>> {
    let n_rows = probabilities.len();
    let labels = probabilities.iter().map(|p| {
        let mut best = 0;
        for (k, &v) in p.iter().enumerate() {
            if v > p[best] {
                best = k;
            }
        }
        classes[best].clone()
    });

    Ok(vec![
        Tensor::utf8_column(labels),
        Tensor::float64(n_rows, classes.len(), probabilities.into_iter().flatten().collect())?,
    ])
}
