//! Naive Bayes classification
//!
//! Continuous features get a per-class Gaussian likelihood. Features listed
//! as categorical in [`FitOptions`] hold category codes and get per-class
//! frequency tables with additive smoothing. Scores are summed in log space
//! and normalized with a softmax.

use serde::{Deserialize, Serialize};
use tabex_core::{FeatureMatrix, Result};

use crate::estimator::{encode_labels, softmax, FitOptions};

/// Naive Bayes options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesConfig {
    /// Fraction of the largest feature variance used as a variance floor
    pub var_smoothing: f64,

    /// Additive smoothing for categorical frequency tables
    pub smoothing: f64,
}

impl Default for NaiveBayesConfig {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
            smoothing: 1.0,
        }
    }
}

/// Per-feature likelihood parameters, indexed by class
#[derive(Debug, Clone, PartialEq)]
pub enum NaiveBayesFeature {
    /// Normal distribution per class
    Gaussian {
        /// Mean per class
        means: Vec<f64>,
        /// Variance per class
        variances: Vec<f64>,
    },

    /// Smoothed category probabilities, `probabilities[class][code]`
    Categorical {
        /// Probability table
        probabilities: Vec<Vec<f64>>,
    },
}

impl NaiveBayesFeature {
    /// Log-likelihood of `value` under class `class`; `None` for unknown codes
    pub fn log_likelihood(&self, class: usize, value: f64) -> Option<f64> {
        match self {
            Self::Gaussian { means, variances } => {
                let variance = variances[class];
                let diff = value - means[class];
                Some(
                    -0.5 * (2.0 * std::f64::consts::PI * variance).ln()
                        - diff * diff / (2.0 * variance),
                )
            }
            Self::Categorical { probabilities } => {
                let table = &probabilities[class];
                category_code(value, table.len()).map(|code| table[code].ln())
            }
        }
    }
}

/// A category code in `0..n`, or `None` for the unknown sentinel and non-codes
pub fn category_code(value: f64, n: usize) -> Option<usize> {
    if value >= 0.0 && value.fract() == 0.0 && value < n as f64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(value as usize)
    } else {
        None
    }
}

/// Fitted naive Bayes classifier
#[derive(Debug, Clone, PartialEq)]
pub struct FittedNaiveBayes {
    classes: Vec<String>,
    class_counts: Vec<f64>,
    features: Vec<NaiveBayesFeature>,
}

impl FittedNaiveBayes {
    /// Build from known parameters
    pub fn from_parameters(
        classes: Vec<String>,
        class_counts: Vec<f64>,
        features: Vec<NaiveBayesFeature>,
    ) -> Self {
        Self {
            classes,
            class_counts,
            features,
        }
    }

    /// Estimate priors and per-feature likelihoods
    pub fn fit(
        x: &FeatureMatrix,
        labels: &[String],
        options: &FitOptions,
        config: &NaiveBayesConfig,
    ) -> Result<Self> {
        let (classes, codes) = encode_labels(labels);
        let n_classes = classes.len();

        let mut class_counts = vec![0.0; n_classes];
        for &c in &codes {
            class_counts[c] += 1.0;
        }

        // Variance floor relative to the widest continuous feature
        let max_variance = (0..x.n_cols())
            .filter(|j| !options.categorical_features.contains(j))
            .map(|j| variance(&x.column(j)))
            .fold(0.0, f64::max);
        let floor = if max_variance > 0.0 {
            config.var_smoothing * max_variance
        } else {
            config.var_smoothing
        };

        let features = (0..x.n_cols())
            .map(|j| {
                let column = x.column(j);
                if options.categorical_features.contains(&j) {
                    categorical_feature(&column, &codes, &class_counts, config.smoothing)
                } else {
                    gaussian_feature(&column, &codes, n_classes, floor)
                }
            })
            .collect();

        Ok(Self {
            classes,
            class_counts,
            features,
        })
    }

    /// Class labels, sorted
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Training rows per class
    pub fn class_counts(&self) -> &[f64] {
        &self.class_counts
    }

    /// Likelihood parameters per feature
    pub fn features(&self) -> &[NaiveBayesFeature] {
        &self.features
    }

    /// Log prior plus summed log-likelihoods, per class
    pub fn joint_log_likelihood(&self, row: &[f64]) -> Vec<f64> {
        let total: f64 = self.class_counts.iter().sum();
        (0..self.classes.len())
            .map(|c| {
                let prior = (self.class_counts[c] / total).ln();
                prior
                    + self
                        .features
                        .iter()
                        .zip(row)
                        .filter_map(|(feature, &value)| feature.log_likelihood(c, value))
                        .sum::<f64>()
            })
            .collect()
    }

    /// Class probabilities per row; width is checked by the caller
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Vec<Vec<f64>> {
        x.rows()
            .map(|row| softmax(&self.joint_log_likelihood(row)))
            .collect()
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

fn gaussian_feature(
    column: &[f64],
    codes: &[usize],
    n_classes: usize,
    floor: f64,
) -> NaiveBayesFeature {
    let mut per_class: Vec<Vec<f64>> = vec![Vec::new(); n_classes];
    for (&value, &c) in column.iter().zip(codes) {
        per_class[c].push(value);
    }

    let means = per_class
        .iter()
        .map(|v| v.iter().sum::<f64>() / v.len() as f64)
        .collect();
    let variances = per_class.iter().map(|v| variance(v).max(floor)).collect();

    NaiveBayesFeature::Gaussian { means, variances }
}

fn categorical_feature(
    column: &[f64],
    codes: &[usize],
    class_counts: &[f64],
    alpha: f64,
) -> NaiveBayesFeature {
    let n_categories = column
        .iter()
        .filter_map(|&v| category_code(v, usize::MAX))
        .max()
        .map_or(0, |m| m + 1);

    let mut counts = vec![vec![0.0; n_categories]; class_counts.len()];
    for (&value, &c) in column.iter().zip(codes) {
        if let Some(code) = category_code(value, n_categories) {
            counts[c][code] += 1.0;
        }
    }

    let width = n_categories as f64;
    let probabilities = counts
        .into_iter()
        .zip(class_counts)
        .map(|(row, &n_c)| {
            row.into_iter()
                .map(|count| (count + alpha) / (n_c + width * alpha))
                .collect()
        })
        .collect();

    NaiveBayesFeature::Categorical { probabilities }
}
