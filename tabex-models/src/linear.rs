//! Ordinary least squares linear regression
//!
//! Solved through the normal equations with a sweep over the cross-product
//! matrix, in column order. A column whose residual variance after sweeping
//! the earlier columns is negligible is linearly dependent on them; it is
//! skipped and receives a zero coefficient.

use serde::{Deserialize, Serialize};
use tabex_core::{FeatureMatrix, Result};
use tracing::warn;

/// Relative pivot tolerance below which a column counts as dependent
const SINGULAR_TOLERANCE: f64 = 1e-9;

/// Linear regression options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegressionConfig {
    /// Fit an intercept term
    pub fit_intercept: bool,
}

impl Default for LinearRegressionConfig {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

/// Fitted linear regression
#[derive(Debug, Clone, PartialEq)]
pub struct FittedLinearRegression {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl FittedLinearRegression {
    /// Build from known parameters
    pub fn from_parameters(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }

    /// Least-squares fit
    pub fn fit(x: &FeatureMatrix, y: &[f64], config: &LinearRegressionConfig) -> Result<Self> {
        let offset = usize::from(config.fit_intercept);
        let p = x.n_cols() + offset;

        // Augmented cross-product matrix [[X'X, X'y], [y'X, y'y]]
        let n = p + 1;
        let mut m = vec![0.0; n * n];
        let mut design = vec![0.0; n];
        for (row, &target) in x.rows().zip(y) {
            if config.fit_intercept {
                design[0] = 1.0;
            }
            design[offset..p].copy_from_slice(row);
            design[p] = target;

            for i in 0..n {
                for j in i..n {
                    m[i * n + j] += design[i] * design[j];
                }
            }
        }
        for i in 0..n {
            for j in 0..i {
                m[i * n + j] = m[j * n + i];
            }
        }

        let original_diagonal: Vec<f64> = (0..p).map(|k| m[k * n + k]).collect();
        let mut swept = vec![false; p];

        for k in 0..p {
            let pivot = m[k * n + k];
            if original_diagonal[k] <= 0.0 || pivot <= SINGULAR_TOLERANCE * original_diagonal[k] {
                if k >= offset {
                    warn!(feature = k - offset, "dropping linearly dependent feature");
                }
                continue;
            }
            sweep(&mut m, n, k);
            swept[k] = true;
        }

        let parameter = |k: usize| if swept[k] { m[k * n + p] } else { 0.0 };
        let intercept = if config.fit_intercept { parameter(0) } else { 0.0 };
        let coefficients = (offset..p).map(parameter).collect();

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    /// Intercept term
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// One coefficient per feature
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// `intercept + x · coefficients` per row; width is checked by the caller
    pub fn predict(&self, x: &FeatureMatrix) -> Vec<f64> {
        x.rows()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(a, b)| a * b)
                        .sum::<f64>()
            })
            .collect()
    }
}

/// Goodnight sweep of row/column `k` of a dense `n x n` matrix
fn sweep(m: &mut [f64], n: usize, k: usize) {
    let d = m[k * n + k];
    for j in 0..n {
        m[k * n + j] /= d;
    }
    for i in 0..n {
        if i == k {
            continue;
        }
        let b = m[i * n + k];
        for j in 0..n {
            m[i * n + j] -= b * m[k * n + j];
        }
        m[i * n + k] = -b / d;
    }
    m[k * n + k] = 1.0 / d;
}
