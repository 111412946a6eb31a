//! Reference scoring runtime for artifacts
//!
//! The engine reads nothing but the artifact: it checks the graph once at
//! construction, then executes the operation list in order for every batch
//! of named inputs. It is the consumer that round-trip tests score against.

mod ops;
pub mod tensor;

use std::collections::{HashMap, HashSet};

use tabex_core::{DataType, Error, RecordBatch, Result};
use tracing::debug;

use crate::artifact::{Artifact, EnsembleObjective, NaiveBayesInput, OpKind, TreeNode};
use crate::config::ArtifactFormat;
use ops::Prepared;
pub use tensor::{EngineInputs, EngineOutputs, Tensor};

/// A validated artifact ready to score
#[derive(Debug)]
pub struct InferenceEngine {
    artifact: Artifact,
    prepared: Vec<Prepared>,
}

/// What validation knows about a tensor
#[derive(Debug, Clone)]
struct TensorInfo {
    element_type: DataType,
    width: usize,
    /// Source column names, while the tensor still holds raw columns
    sources: Option<Vec<String>>,
}

fn corrupt(message: impl Into<String>) -> Error {
    Error::ArtifactCorrupt(message.into())
}

impl InferenceEngine {
    /// Validate an artifact's structure
    pub fn new(artifact: Artifact) -> Result<Self> {
        let mut known: HashMap<String, TensorInfo> = HashMap::new();

        for slot in &artifact.inputs {
            if slot.shape != crate::artifact::batch_shape(slot.columns.len()) {
                return Err(corrupt(format!(
                    "input slot '{}' shape {:?} disagrees with {} columns",
                    slot.name,
                    slot.shape,
                    slot.columns.len()
                )));
            }
            let info = TensorInfo {
                element_type: slot.element_type,
                width: slot.columns.len(),
                sources: Some(slot.columns.clone()),
            };
            if known.insert(slot.name.clone(), info).is_some() {
                return Err(corrupt(format!("duplicate tensor name '{}'", slot.name)));
            }
        }

        let mut referenced = HashSet::new();
        let mut prepared = Vec::with_capacity(artifact.operations.len());

        for (position, op) in artifact.operations.iter().enumerate() {
            let inputs = op
                .inputs
                .iter()
                .map(|name| {
                    referenced.insert(name.as_str());
                    known.get(name).cloned().ok_or_else(|| {
                        corrupt(format!(
                            "operation {position} ({}) reads unknown tensor '{name}'",
                            op.kind.name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let outputs = infer_outputs(&op.kind, &inputs).map_err(|reason| {
                corrupt(format!("operation {position} ({}): {reason}", op.kind.name()))
            })?;

            if outputs.len() != op.outputs.len() {
                return Err(corrupt(format!(
                    "operation {position} ({}) declares {} outputs, produces {}",
                    op.kind.name(),
                    op.outputs.len(),
                    outputs.len()
                )));
            }
            for (decl, info) in op.outputs.iter().zip(outputs) {
                if decl.element_type != info.element_type || decl.width() != Some(info.width) {
                    return Err(corrupt(format!(
                        "output '{}' declared {} {:?}, produces {} of width {}",
                        decl.name, decl.element_type, decl.shape, info.element_type, info.width
                    )));
                }
                if known.insert(decl.name.clone(), info).is_some() {
                    return Err(corrupt(format!("duplicate tensor name '{}'", decl.name)));
                }
            }

            let source = inputs
                .first()
                .and_then(|i| i.sources.as_ref())
                .filter(|s| s.len() == 1)
                .map_or_else(|| op.inputs.join(","), |s| s[0].clone());
            prepared.push(Prepared::new(&op.kind, &source)?);
        }

        if let Some(unused) = artifact
            .inputs
            .iter()
            .find(|slot| !referenced.contains(slot.name.as_str()))
        {
            return Err(corrupt(format!("input slot '{}' is never read", unused.name)));
        }

        if !artifact.operations.iter().any(|op| op.kind.is_estimator()) {
            return Err(corrupt("no estimator operation"));
        }
        if artifact.outputs.is_empty() {
            return Err(corrupt("no outputs declared"));
        }
        for output in &artifact.outputs {
            let info = known
                .get(&output.name)
                .ok_or_else(|| corrupt(format!("output '{}' is never produced", output.name)))?;
            if info.element_type != output.element_type || output.width() != Some(info.width) {
                return Err(corrupt(format!(
                    "output '{}' type or shape disagrees with its producer",
                    output.name
                )));
            }
        }

        debug!(
            inputs = artifact.inputs.len(),
            operations = artifact.operations.len(),
            "validated artifact"
        );

        Ok(Self { artifact, prepared })
    }

    /// Decode and validate
    pub fn from_bytes(bytes: &[u8], format: ArtifactFormat) -> Result<Self> {
        Self::new(Artifact::from_bytes(bytes, format)?)
    }

    /// The validated artifact
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Score one batch of named inputs
    pub fn run(&self, inputs: &EngineInputs) -> Result<EngineOutputs> {
        let mut tensors: HashMap<&str, Tensor> = HashMap::new();
        let mut n_rows = None;

        for slot in &self.artifact.inputs {
            let tensor = inputs
                .get(&slot.name)
                .ok_or_else(|| Error::UnknownColumn(format!("input slot '{}'", slot.name)))?;

            if tensor.element_type() != slot.element_type {
                return Err(Error::TypeMismatch(format!(
                    "input slot '{}' expects {}, got {}",
                    slot.name,
                    slot.element_type,
                    tensor.element_type()
                )));
            }
            if tensor.n_cols() != slot.columns.len() {
                return Err(Error::shape(
                    format!("{} columns in slot '{}'", slot.columns.len(), slot.name),
                    format!("{} columns", tensor.n_cols()),
                ));
            }
            tensor.check_len()?;
            match n_rows {
                Some(n) if n != tensor.n_rows() => {
                    return Err(Error::shape(
                        format!("{n} rows in every slot"),
                        format!("{} rows in slot '{}'", tensor.n_rows(), slot.name),
                    ));
                }
                _ => n_rows = Some(tensor.n_rows()),
            }

            tensors.insert(slot.name.as_str(), tensor.clone());
        }

        for (op, prepared) in self.artifact.operations.iter().zip(&self.prepared) {
            let args = op
                .inputs
                .iter()
                .map(|name| {
                    tensors
                        .get(name.as_str())
                        .ok_or_else(|| corrupt(format!("tensor '{name}' missing at run time")))
                })
                .collect::<Result<Vec<_>>>()?;

            let produced = ops::execute(&op.kind, prepared, &args)?;
            for (decl, tensor) in op.outputs.iter().zip(produced) {
                tensors.insert(decl.name.as_str(), tensor);
            }
        }

        let mut outputs = EngineOutputs::default();
        for output in &self.artifact.outputs {
            let tensor = tensors
                .remove(output.name.as_str())
                .ok_or_else(|| corrupt(format!("output '{}' missing at run time", output.name)))?;
            outputs.insert(&output.name, tensor);
        }
        Ok(outputs)
    }

    /// Build named inputs from a record batch using each slot's column list
    pub fn inputs_from_batch(&self, batch: &RecordBatch) -> Result<EngineInputs> {
        let mut inputs = EngineInputs::new();

        for slot in &self.artifact.inputs {
            let columns = slot
                .columns
                .iter()
                .map(|name| batch.column_by_name(name))
                .collect::<Result<Vec<_>>>()?;
            let n_rows = batch.row_count();
            let n_cols = columns.len();

            let tensor = match slot.element_type {
                DataType::Float64 => {
                    let values = columns
                        .iter()
                        .map(|c| c.as_f64())
                        .collect::<Result<Vec<_>>>()?;
                    let data = (0..n_rows)
                        .flat_map(|i| values.iter().map(move |v| v[i]))
                        .collect();
                    Tensor::float64(n_rows, n_cols, data)?
                }
                DataType::Utf8 => {
                    let values = columns
                        .iter()
                        .map(|c| c.as_utf8())
                        .collect::<Result<Vec<_>>>()?;
                    let data = (0..n_rows)
                        .flat_map(|i| values.iter().map(move |v| v[i].clone()))
                        .collect();
                    Tensor::utf8(n_rows, n_cols, data)?
                }
            };
            inputs.insert(&slot.name, tensor);
        }

        Ok(inputs)
    }
}

fn float(width: usize) -> TensorInfo {
    TensorInfo {
        element_type: DataType::Float64,
        width,
        sources: None,
    }
}

fn label_outputs(n_classes: usize) -> Vec<TensorInfo> {
    vec![
        TensorInfo {
            element_type: DataType::Utf8,
            width: 1,
            sources: None,
        },
        float(n_classes),
    ]
}

/// Validation outcome; the message is wrapped into `ArtifactCorrupt`
type Check<T> = std::result::Result<T, String>;

fn single(inputs: &[TensorInfo], element_type: DataType) -> Check<&TensorInfo> {
    match inputs {
        [input] if input.element_type == element_type => Ok(input),
        [input] => Err(format!("expects {element_type}, got {}", input.element_type)),
        _ => Err(format!("expects one input, got {}", inputs.len())),
    }
}

fn expect_width(actual: usize, expected: usize, what: &str) -> Check<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected}, got {actual}"))
    }
}

/// Output types and widths an operation produces from the given inputs
fn infer_outputs(kind: &OpKind, inputs: &[TensorInfo]) -> Check<Vec<TensorInfo>> {
    match kind {
        OpKind::SelectColumns { indices } => {
            let input = match inputs {
                [input] => input,
                _ => return Err(format!("expects one input, got {}", inputs.len())),
            };
            if let Some(bad) = indices.iter().find(|&&j| j >= input.width) {
                return Err(format!("column {bad} out of range for width {}", input.width));
            }
            Ok(vec![TensorInfo {
                element_type: input.element_type,
                width: indices.len(),
                sources: input
                    .sources
                    .as_ref()
                    .map(|s| indices.iter().map(|&j| s[j].clone()).collect()),
            }])
        }
        OpKind::Passthrough => {
            let input = single(inputs, DataType::Float64)?;
            Ok(vec![float(input.width)])
        }
        OpKind::OneHotEncode { categories, .. } => {
            expect_width(single(inputs, DataType::Utf8)?.width, 1, "input width")?;
            Ok(vec![float(categories.len())])
        }
        OpKind::OrdinalEncode { .. } => {
            expect_width(single(inputs, DataType::Utf8)?.width, 1, "input width")?;
            Ok(vec![float(1)])
        }
        OpKind::TokenizeAndCount {
            vocabulary, idf, ..
        } => {
            expect_width(single(inputs, DataType::Utf8)?.width, 1, "input width")?;
            if let Some(idf) = idf {
                expect_width(idf.len(), vocabulary.len(), "idf length")?;
            }
            Ok(vec![float(vocabulary.len())])
        }
        OpKind::Concatenate => {
            if inputs.is_empty() {
                return Err("expects at least one input".into());
            }
            if inputs.iter().any(|i| i.element_type != DataType::Float64) {
                return Err("expects Float64 inputs".into());
            }
            Ok(vec![float(inputs.iter().map(|i| i.width).sum())])
        }
        OpKind::LinearRegressor { coefficients, .. } => {
            let input = single(inputs, DataType::Float64)?;
            expect_width(coefficients.len(), input.width, "coefficient count")?;
            Ok(vec![float(1)])
        }
        OpKind::NaiveBayesClassifier {
            classes,
            class_counts,
            features,
        } => {
            let input = single(inputs, DataType::Float64)?;
            let n_classes = classes.len();
            if n_classes == 0 {
                return Err("no classes".into());
            }
            expect_width(class_counts.len(), n_classes, "class count length")?;
            expect_width(features.len(), input.width, "feature count")?;
            for feature in features {
                match feature {
                    NaiveBayesInput::Gaussian { means, variances } => {
                        expect_width(means.len(), n_classes, "means")?;
                        expect_width(variances.len(), n_classes, "variances")?;
                    }
                    NaiveBayesInput::Categorical { probabilities } => {
                        expect_width(probabilities.len(), n_classes, "probability tables")?;
                    }
                }
            }
            Ok(label_outputs(n_classes))
        }
        OpKind::TreeEnsemble {
            objective,
            classes,
            base_scores,
            trees,
        } => {
            let input = single(inputs, DataType::Float64)?;
            let n_outputs = match objective {
                EnsembleObjective::Regression => 1,
                EnsembleObjective::Logistic => {
                    expect_width(classes.len(), 2, "logistic class count")?;
                    1
                }
                EnsembleObjective::Softmax => classes.len(),
            };
            expect_width(base_scores.len(), n_outputs, "base score count")?;

            for (t, tree) in trees.iter().enumerate() {
                if tree.class_index >= n_outputs {
                    return Err(format!("tree {t} adds to missing output {}", tree.class_index));
                }
                if tree.nodes.is_empty() {
                    return Err(format!("tree {t} has no nodes"));
                }
                for node in &tree.nodes {
                    if let TreeNode::Branch {
                        feature,
                        left,
                        right,
                        ..
                    } = node
                    {
                        if *feature >= input.width
                            || *left >= tree.nodes.len()
                            || *right >= tree.nodes.len()
                        {
                            return Err(format!("tree {t} has an out-of-range branch"));
                        }
                    }
                }
            }

            match objective {
                EnsembleObjective::Regression => Ok(vec![float(1)]),
                _ => Ok(label_outputs(classes.len())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{
        batch_shape, InputSlot, Operation, Producer, TensorDecl, UnknownPolicy, FORMAT_VERSION,
    };

    fn linear_artifact() -> Artifact {
        Artifact {
            format_version: FORMAT_VERSION,
            producer: Producer::default(),
            inputs: vec![InputSlot {
                name: "numeric_input".into(),
                element_type: DataType::Float64,
                columns: vec!["x".into()],
                shape: batch_shape(1),
            }],
            operations: vec![
                Operation {
                    inputs: vec!["numeric_input".into()],
                    kind: OpKind::LinearRegressor {
                        intercept: 3.0,
                        coefficients: vec![5.0],
                    },
                    outputs: vec![TensorDecl::batch("prediction", DataType::Float64, 1)],
                },
            ],
            outputs: vec![TensorDecl::batch("prediction", DataType::Float64, 1)],
        }
    }

    #[test]
    fn test_runs_linear_graph() {
        let engine = InferenceEngine::new(linear_artifact()).unwrap();
        let inputs = EngineInputs::new().with("numeric_input", Tensor::float64_column(vec![10.0]));

        let outputs = engine.run(&inputs).unwrap();
        assert_eq!(outputs.prediction().unwrap(), vec![53.0]);
    }

    #[test]
    fn test_missing_and_mistyped_inputs() {
        let engine = InferenceEngine::new(linear_artifact()).unwrap();

        assert!(matches!(
            engine.run(&EngineInputs::new()),
            Err(Error::UnknownColumn(_))
        ));
        let wrong = EngineInputs::new().with("numeric_input", Tensor::utf8_column(["10"]));
        assert!(matches!(engine.run(&wrong), Err(Error::TypeMismatch(_))));
        let wide = EngineInputs::new()
            .with("numeric_input", Tensor::float64(1, 2, vec![1.0, 2.0]).unwrap());
        assert!(matches!(engine.run(&wide), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_dangling_reference_is_corrupt() {
        let mut artifact = linear_artifact();
        artifact.operations[0].inputs = vec!["nowhere".into()];
        assert!(matches!(
            InferenceEngine::new(artifact),
            Err(Error::ArtifactCorrupt(_))
        ));
    }

    #[test]
    fn test_coefficient_width_checked() {
        let mut artifact = linear_artifact();
        artifact.operations[0].kind = OpKind::LinearRegressor {
            intercept: 0.0,
            coefficients: vec![1.0, 2.0],
        };
        assert!(matches!(
            InferenceEngine::new(artifact),
            Err(Error::ArtifactCorrupt(_))
        ));
    }

    #[test]
    fn test_unused_slot_is_corrupt() {
        let mut artifact = linear_artifact();
        artifact.inputs.push(InputSlot {
            name: "text_input".into(),
            element_type: DataType::Utf8,
            columns: vec!["body".into()],
            shape: batch_shape(1),
        });
        assert!(matches!(
            InferenceEngine::new(artifact),
            Err(Error::ArtifactCorrupt(_))
        ));
    }

    #[test]
    fn test_unknown_category_names_source_column() {
        let artifact = Artifact {
            format_version: FORMAT_VERSION,
            producer: Producer::default(),
            inputs: vec![InputSlot {
                name: "categorical_input".into(),
                element_type: DataType::Utf8,
                columns: vec!["state".into()],
                shape: batch_shape(1),
            }],
            operations: vec![
                Operation {
                    inputs: vec!["categorical_input".into()],
                    kind: OpKind::SelectColumns { indices: vec![0] },
                    outputs: vec![TensorDecl::batch("state/columns", DataType::Utf8, 1)],
                },
                Operation {
                    inputs: vec!["state/columns".into()],
                    kind: OpKind::OneHotEncode {
                        categories: vec!["CA".into()],
                        handle_unknown: UnknownPolicy::Error,
                    },
                    outputs: vec![TensorDecl::batch("state/features", DataType::Float64, 1)],
                },
                Operation {
                    inputs: vec!["state/features".into()],
                    kind: OpKind::LinearRegressor {
                        intercept: 0.0,
                        coefficients: vec![1.0],
                    },
                    outputs: vec![TensorDecl::batch("prediction", DataType::Float64, 1)],
                },
            ],
            outputs: vec![TensorDecl::batch("prediction", DataType::Float64, 1)],
        };
        let engine = InferenceEngine::new(artifact).unwrap();
        let inputs = EngineInputs::new().with("categorical_input", Tensor::utf8_column(["TX"]));

        match engine.run(&inputs) {
            Err(Error::UnknownCategory { column, .. }) => assert_eq!(column, "state"),
            other => panic!("expected UnknownCategory, got {other:?}"),
        }
    }
}
