//! Error types for tabex pipelines

use std::io;
use thiserror::Error;

/// Result type for tabex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by fitting, transforming, exporting and scoring
#[derive(Error, Debug)]
pub enum Error {
    /// A selector or input references a column that does not exist
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// A value's kind disagrees with the declared column kind
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A category value never seen at fit time, under the strict policy
    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory {
        /// Source column
        column: String,
        /// Offending value
        value: String,
    },

    /// Widths or row counts disagree
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Expected shape description
        expected: String,
        /// Actual shape description
        got: String,
    },

    /// A transformer has no equivalent in the target format
    #[error("Unsupported transformer: {0}")]
    UnsupportedTransformer(String),

    /// An estimator has no equivalent in the target format
    #[error("Unsupported estimator: {0}")]
    UnsupportedEstimator(String),

    /// Two declared names or shapes collide
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    /// A serialized artifact cannot be parsed or is structurally invalid
    #[error("Artifact corrupt: {0}")]
    ArtifactCorrupt(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Binary serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid token pattern
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Build a [`Error::ShapeMismatch`] from anything printable
    pub fn shape(expected: impl ToString, got: impl ToString) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_display() {
        let err = Error::UnknownCategory {
            column: "state".to_string(),
            value: "TX".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown category 'TX' in column 'state'");
    }

    #[test]
    fn test_shape_helper() {
        let err = Error::shape(3, "2 columns");
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert_eq!(err.to_string(), "Shape mismatch: expected 3, got 2 columns");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
