//! The closed set of estimators and their shared fit/predict contract

use serde::{Deserialize, Serialize};
use tabex_core::{Error, FeatureMatrix, Result};

use crate::gbdt::{FittedGradientBoosting, GradientBoostingConfig};
use crate::linear::{FittedLinearRegression, LinearRegressionConfig};
use crate::naive_bayes::{FittedNaiveBayes, NaiveBayesConfig};

/// Training targets, one per row
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Continuous targets for regression
    Numeric(Vec<f64>),

    /// Class labels
    Labels(Vec<String>),
}

impl Targets {
    /// Build label targets from anything string-like
    pub fn labels<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::Labels(values.into_iter().map(Into::into).collect())
    }

    /// Number of targets
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Labels(v) => v.len(),
        }
    }

    /// Whether there are no targets
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric targets, or `TypeMismatch`
    pub fn as_numeric(&self) -> Result<&[f64]> {
        match self {
            Self::Numeric(v) => Ok(v),
            Self::Labels(_) => Err(Error::TypeMismatch(
                "expected numeric targets, got labels".into(),
            )),
        }
    }

    /// Label targets, or `TypeMismatch`
    pub fn as_labels(&self) -> Result<&[String]> {
        match self {
            Self::Labels(v) => Ok(v),
            Self::Numeric(_) => Err(Error::TypeMismatch(
                "expected label targets, got numeric".into(),
            )),
        }
    }
}

/// Hints passed to an estimator alongside the feature matrix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FitOptions {
    /// Feature indices that hold category codes rather than magnitudes
    pub categorical_features: Vec<usize>,
}

/// What a fitted estimator predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// A scalar per row
    Regression,
    /// One of two labels per row
    BinaryClassification,
    /// One of three or more labels per row
    MulticlassClassification,
}

impl Task {
    /// Task implied by a number of distinct classes
    pub fn for_classes(n_classes: usize) -> Self {
        if n_classes > 2 {
            Self::MulticlassClassification
        } else {
            Self::BinaryClassification
        }
    }

    /// Whether this is a classification task
    pub fn is_classification(self) -> bool {
        !matches!(self, Self::Regression)
    }
}

/// Predictions for a batch
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    /// Regression outputs
    Values(Vec<f64>),

    /// Predicted class labels
    Labels(Vec<String>),
}

impl Predictions {
    /// Number of predictions
    pub fn len(&self) -> usize {
        match self {
            Self::Values(v) => v.len(),
            Self::Labels(v) => v.len(),
        }
    }

    /// Whether there are no predictions
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Regression outputs, if this is a regression result
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            Self::Values(v) => Some(v),
            Self::Labels(_) => None,
        }
    }

    /// Labels, if this is a classification result
    pub fn labels(&self) -> Option<&[String]> {
        match self {
            Self::Labels(v) => Some(v),
            Self::Values(_) => None,
        }
    }
}

/// An unfitted estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    /// Ordinary least squares
    LinearRegression(LinearRegressionConfig),

    /// Gaussian / categorical naive Bayes
    NaiveBayes(NaiveBayesConfig),

    /// Gradient-boosted decision trees
    GradientBoosting(GradientBoostingConfig),
}

impl Estimator {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::LinearRegression(_) => "linear_regression",
            Self::NaiveBayes(_) => "naive_bayes",
            Self::GradientBoosting(_) => "gradient_boosting",
        }
    }

    /// Fit on a feature matrix, returning a new immutable value
    pub fn fit(
        &self,
        x: &FeatureMatrix,
        y: &Targets,
        options: &FitOptions,
    ) -> Result<FittedEstimator> {
        if x.n_rows() != y.len() {
            return Err(Error::shape(
                format!("{} targets", x.n_rows()),
                format!("{} targets", y.len()),
            ));
        }
        if x.n_rows() == 0 {
            return Err(Error::InvalidArgument(format!(
                "cannot fit {} on zero rows",
                self.name()
            )));
        }
        if let Some(&bad) = options.categorical_features.iter().find(|&&i| i >= x.n_cols()) {
            return Err(Error::InvalidArgument(format!(
                "categorical feature {bad} out of range for {} features",
                x.n_cols()
            )));
        }

        match self {
            Self::LinearRegression(config) => {
                FittedLinearRegression::fit(x, y.as_numeric()?, config)
                    .map(FittedEstimator::LinearRegression)
            }
            Self::NaiveBayes(config) => {
                FittedNaiveBayes::fit(x, y.as_labels()?, options, config)
                    .map(FittedEstimator::NaiveBayes)
            }
            Self::GradientBoosting(config) => FittedGradientBoosting::fit(x, y, options, config)
                .map(FittedEstimator::GradientBoosting),
        }
    }
}

/// A fitted estimator
#[derive(Debug, Clone, PartialEq)]
pub enum FittedEstimator {
    /// Fitted linear regression
    LinearRegression(FittedLinearRegression),

    /// Fitted naive Bayes
    NaiveBayes(FittedNaiveBayes),

    /// Fitted tree ensemble
    GradientBoosting(FittedGradientBoosting),
}

impl FittedEstimator {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::LinearRegression(_) => "linear_regression",
            Self::NaiveBayes(_) => "naive_bayes",
            Self::GradientBoosting(_) => "gradient_boosting",
        }
    }

    /// What this estimator predicts
    pub fn task(&self) -> Task {
        match self {
            Self::LinearRegression(_) => Task::Regression,
            Self::NaiveBayes(nb) => Task::for_classes(nb.classes().len()),
            Self::GradientBoosting(gb) => gb.task(),
        }
    }

    /// Feature width expected at predict time
    pub fn n_features_in(&self) -> usize {
        match self {
            Self::LinearRegression(lr) => lr.coefficients().len(),
            Self::NaiveBayes(nb) => nb.features().len(),
            Self::GradientBoosting(gb) => gb.n_features_in(),
        }
    }

    /// Class labels in probability-column order; empty for regression
    pub fn classes(&self) -> &[String] {
        match self {
            Self::LinearRegression(_) => &[],
            Self::NaiveBayes(nb) => nb.classes(),
            Self::GradientBoosting(gb) => gb.classes(),
        }
    }

    /// Predict one value or label per row
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Predictions> {
        check_width(x, self.n_features_in())?;

        match self {
            Self::LinearRegression(lr) => Ok(Predictions::Values(lr.predict(x))),
            Self::GradientBoosting(gb) if !gb.task().is_classification() => {
                Ok(Predictions::Values(gb.predict_raw(x)?))
            }
            Self::NaiveBayes(_) | Self::GradientBoosting(_) => {
                let probabilities = self.predict_proba(x)?;
                let classes = self.classes();
                Ok(Predictions::Labels(
                    probabilities
                        .iter()
                        .map(|p| classes[argmax(p)].clone())
                        .collect(),
                ))
            }
        }
    }

    /// Per-class probabilities, one row per input row
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>> {
        check_width(x, self.n_features_in())?;

        match self {
            Self::LinearRegression(_) => Err(Error::InvalidOperation(
                "predict_proba on a regression estimator".into(),
            )),
            Self::NaiveBayes(nb) => Ok(nb.predict_proba(x)),
            Self::GradientBoosting(gb) => gb.predict_proba(x),
        }
    }
}

/// Fail with `ShapeMismatch` unless `x` has `expected` columns
pub fn check_width(x: &FeatureMatrix, expected: usize) -> Result<()> {
    if x.n_cols() == expected {
        Ok(())
    } else {
        Err(Error::shape(
            format!("{expected} features"),
            format!("{} features", x.n_cols()),
        ))
    }
}

/// Index of the largest value; ties go to the first
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Sorted distinct labels and each row's class index
pub fn encode_labels(labels: &[String]) -> (Vec<String>, Vec<usize>) {
    let mut classes: Vec<String> = labels.to_vec();
    classes.sort();
    classes.dedup();

    let codes = labels
        .iter()
        .map(|l| classes.binary_search(l).unwrap_or_default())
        .collect();

    (classes, codes)
}

/// Numerically stable softmax
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Logistic function
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
