//! Core data structures and abstractions for tabex pipelines
//!
//! This crate provides the foundational components shared by the transformer,
//! estimator and export crates: the error taxonomy, typed columns and record
//! batches, column selectors, and the dense feature matrix that flows between
//! a column composer and an estimator.

#![warn(missing_docs)]

pub mod column;
pub mod error;
pub mod matrix;
pub mod record_batch;
pub mod schema;
pub mod selector;
pub mod transform;

// Re-export key types for convenience
pub use column::{Column, ColumnData};
pub use error::{Error, Result};
pub use matrix::FeatureMatrix;
pub use record_batch::RecordBatch;
pub use schema::{ColumnKind, DataType, Field, Schema};
pub use selector::ColumnSelector;
pub use transform::FeatureTransform;
