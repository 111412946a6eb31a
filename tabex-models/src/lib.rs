//! Estimators and pipelines for tabex
//!
//! Three estimator families are supported: ordinary least squares
//! regression, naive Bayes classification, and gradient-boosted trees for
//! both. A [`Pipeline`] pairs a column composer with one estimator and fits
//! them in two phases.

#![warn(missing_docs)]

pub mod estimator;
pub mod gbdt;
pub mod linear;
pub mod metrics;
pub mod naive_bayes;
pub mod pipeline;

pub use estimator::{Estimator, FitOptions, FittedEstimator, Predictions, Targets, Task};
pub use gbdt::{
    BoostedTree, FittedGradientBoosting, GradientBoostingConfig, Node, Objective,
    SplitCondition, Tree,
};
pub use linear::{FittedLinearRegression, LinearRegressionConfig};
pub use naive_bayes::{FittedNaiveBayes, NaiveBayesConfig, NaiveBayesFeature};
pub use pipeline::{FittedPipeline, Pipeline};
