//! Transform traits for turning record batches into feature matrices

use crate::error::Result;
use crate::matrix::FeatureMatrix;
use crate::record_batch::RecordBatch;

/// A fitted transformation from a record batch to a fixed-width feature matrix
///
/// Implementors are immutable once fitted, so `transform` takes `&self` and
/// may be called concurrently.
pub trait FeatureTransform: Send + Sync {
    /// Transform a record batch
    fn transform(&self, batch: &RecordBatch) -> Result<FeatureMatrix>;

    /// Width of every matrix produced by [`FeatureTransform::transform`]
    fn n_features_out(&self) -> usize;

    /// Name of each output feature, `n_features_out` long
    fn feature_names(&self) -> Vec<String>;

    /// Whether row `i` of the output depends only on row `i` of the input
    fn preserves_order(&self) -> bool {
        true
    }
}
