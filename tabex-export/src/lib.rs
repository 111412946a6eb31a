//! Portable export for fitted tabex pipelines
//!
//! [`export`] turns a [`tabex_models::FittedPipeline`] into an [`Artifact`]:
//! a self-describing dataflow graph that can be written as JSON or binary
//! and scored by any runtime that implements its operation set. The
//! [`InferenceEngine`] in this crate is such a runtime and depends only on
//! the artifact. [`to_pmml`] renders the subset of pipelines PMML can hold.

#![warn(missing_docs)]

pub mod artifact;
pub mod config;
pub mod engine;
pub mod exporter;
pub mod io;
pub mod pmml;

pub use artifact::{Artifact, InputSlot, OpKind, Operation, TensorDecl, FORMAT_VERSION};
pub use config::{ArtifactFormat, ExportConfig, PmmlConfig};
pub use engine::{EngineInputs, EngineOutputs, InferenceEngine, Tensor};
pub use exporter::export;
pub use io::{read_artifact, write_artifact};
pub use pmml::to_pmml;
