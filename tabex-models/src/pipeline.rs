//! Column composer followed by an estimator
//!
//! Fitting is two-phase: the composer is fitted and applied to the training
//! batch, then the estimator is fitted on the resulting matrix. A failed fit
//! returns only the error, so no partially fitted pipeline can exist.

use tabex_core::{Error, FeatureTransform, RecordBatch, Result};
use tabex_transforms::{ColumnComposer, FittedComposer};
use tracing::info;

use crate::estimator::{Estimator, FitOptions, FittedEstimator, Predictions, Targets};

/// An unfitted pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    composer: ColumnComposer,
    estimator: Estimator,
}

impl Pipeline {
    /// Pair a composer with an estimator
    pub fn new(composer: ColumnComposer, estimator: Estimator) -> Self {
        Self {
            composer,
            estimator,
        }
    }

    /// Column composer
    pub fn composer(&self) -> &ColumnComposer {
        &self.composer
    }

    /// Estimator
    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Fit the composer, then the estimator on its output
    pub fn fit(&self, batch: &RecordBatch, targets: &Targets) -> Result<FittedPipeline> {
        if targets.len() != batch.row_count() {
            return Err(Error::shape(
                format!("{} targets", batch.row_count()),
                format!("{} targets", targets.len()),
            ));
        }

        let composer = self.composer.fit(batch)?;
        let features = composer.transform(batch)?;

        let options = FitOptions {
            categorical_features: composer.categorical_feature_indices(),
        };
        let estimator = self.estimator.fit(&features, targets, &options)?;

        info!(
            estimator = estimator.name(),
            rows = batch.row_count(),
            features = features.n_cols(),
            "fitted pipeline"
        );

        FittedPipeline::new(composer, estimator)
    }
}

/// A fitted pipeline, immutable and safe to share across threads
#[derive(Debug, Clone)]
pub struct FittedPipeline {
    composer: FittedComposer,
    estimator: FittedEstimator,
}

impl FittedPipeline {
    /// Join a fitted composer and estimator; their widths must agree
    pub fn new(composer: FittedComposer, estimator: FittedEstimator) -> Result<Self> {
        if composer.n_features_out() != estimator.n_features_in() {
            return Err(Error::shape(
                format!("{} estimator inputs", composer.n_features_out()),
                format!("{} estimator inputs", estimator.n_features_in()),
            ));
        }
        Ok(Self {
            composer,
            estimator,
        })
    }

    /// Fitted composer
    pub fn composer(&self) -> &FittedComposer {
        &self.composer
    }

    /// Fitted estimator
    pub fn estimator(&self) -> &FittedEstimator {
        &self.estimator
    }

    /// Transform then predict
    pub fn predict(&self, batch: &RecordBatch) -> Result<Predictions> {
        self.estimator.predict(&self.composer.transform(batch)?)
    }

    /// Transform then predict class probabilities
    pub fn predict_proba(&self, batch: &RecordBatch) -> Result<Vec<Vec<f64>>> {
        self.estimator.predict_proba(&self.composer.transform(batch)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::GradientBoostingConfig;
    use crate::linear::{FittedLinearRegression, LinearRegressionConfig};
    use crate::naive_bayes::NaiveBayesConfig;
    use proptest::prelude::*;
    use tabex_core::{Column, ColumnSelector};
    use tabex_transforms::{CategoricalEncoderConfig, HandleUnknown, Transformer};

    fn line_batch(xs: &[f64]) -> RecordBatch {
        RecordBatch::new(vec![Column::from_f64("x", xs.to_vec())]).unwrap()
    }

    fn line_pipeline() -> Pipeline {
        Pipeline::new(
            ColumnComposer::new().add("x", ColumnSelector::name("x"), Transformer::Passthrough),
            Estimator::LinearRegression(LinearRegressionConfig::default()),
        )
    }

    #[test]
    fn test_recovers_line_through_pipeline() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = Targets::Numeric(xs.iter().map(|x| 5.0 * x + 3.0).collect());
        let fitted = line_pipeline().fit(&line_batch(&xs), &y).unwrap();

        match fitted.estimator() {
            FittedEstimator::LinearRegression(lr) => {
                assert!((lr.intercept() - 3.0).abs() < 1e-9);
                assert!((lr.coefficients()[0] - 5.0).abs() < 1e-9);
            }
            other => panic!("expected linear regression, got {other:?}"),
        }

        let predictions = fitted.predict(&line_batch(&[10.0])).unwrap();
        assert!((predictions.values().unwrap()[0] - 53.0).abs() < 1e-9);
        assert!(matches!(
            fitted.predict_proba(&line_batch(&[10.0])),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_width_checked_when_joining() {
        let fitted = line_pipeline()
            .fit(&line_batch(&[1.0, 2.0, 3.0]), &Targets::Numeric(vec![1.0, 2.0, 3.0]))
            .unwrap();
        let wrong = FittedEstimator::LinearRegression(FittedLinearRegression::from_parameters(
            0.0,
            vec![1.0, 1.0],
        ));

        assert!(matches!(
            FittedPipeline::new(fitted.composer().clone(), wrong),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_target_length_checked() {
        assert!(matches!(
            line_pipeline().fit(&line_batch(&[1.0, 2.0]), &Targets::Numeric(vec![1.0])),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    fn houses() -> (RecordBatch, Targets) {
        let batch = RecordBatch::new(vec![
            Column::from_f64("bedrooms", vec![1.0, 2.0, 2.0, 3.0, 4.0, 4.0]),
            Column::from_strings("state", ["CA", "CA", "NY", "NY", "TX", "TX"]),
        ])
        .unwrap();
        let labels = Targets::labels(["cheap", "cheap", "mid", "mid", "pricey", "pricey"]);
        (batch, labels)
    }

    fn native_state() -> ColumnComposer {
        ColumnComposer::new()
            .add("beds", ColumnSelector::name("bedrooms"), Transformer::Passthrough)
            .add(
                "state",
                ColumnSelector::name("state"),
                Transformer::CategoricalEncoder(CategoricalEncoderConfig::ordinal(
                    HandleUnknown::Ignore,
                )),
            )
    }

    #[test]
    fn test_naive_bayes_with_native_categories() {
        let (batch, labels) = houses();
        let pipeline = Pipeline::new(
            native_state(),
            Estimator::NaiveBayes(NaiveBayesConfig::default()),
        );
        let fitted = pipeline.fit(&batch, &labels).unwrap();

        let predictions = fitted.predict(&batch).unwrap();
        assert_eq!(predictions.len(), 6);
        let proba = fitted.predict_proba(&batch).unwrap();
        assert!(proba.iter().all(|p| p.len() == 3));
    }

    #[test]
    fn test_failed_fit_yields_only_error() {
        let (batch, _) = houses();
        let pipeline = Pipeline::new(
            native_state(),
            Estimator::GradientBoosting(GradientBoostingConfig::default()),
        );
        // Single class
        let labels = Targets::labels(["a"; 6]);
        assert!(pipeline.fit(&batch, &labels).is_err());
    }

    proptest! {
        #[test]
        fn prop_row_order_preserved(seed in prop::collection::vec(0usize..6, 1..12)) {
            let (batch, labels) = houses();
            let fitted = Pipeline::new(
                native_state(),
                Estimator::GradientBoosting(GradientBoostingConfig {
                    n_estimators: 10,
                    ..Default::default()
                }),
            )
            .fit(&batch, &labels)
            .unwrap();

            let all = fitted.predict_proba(&batch).unwrap();
            let shuffled = fitted.predict_proba(&batch.take(&seed).unwrap()).unwrap();
            for (row, &source) in shuffled.iter().zip(&seed) {
                prop_assert_eq!(row, &all[source]);
            }
        }
    }
}
