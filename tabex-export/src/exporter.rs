//! Fitted pipeline to artifact
//!
//! Source columns are grouped into one input slot per kind. Each composer
//! step becomes a `SelectColumns` from its slot followed by the step's own
//! operation; the blocks are concatenated in composer order and fed to one
//! terminal estimator operation.

use std::collections::HashSet;

use tabex_core::{ColumnKind, DataType, Error, FeatureTransform, Result};
use tabex_models::{
    FittedEstimator, FittedGradientBoosting, FittedPipeline, NaiveBayesFeature, Node, Objective,
    SplitCondition, Task,
};
use tabex_transforms::{CategoricalOutput, FittedStep, FittedTransformer, HandleUnknown};
use tracing::{debug, info};

use crate::artifact::{
    batch_shape, names, Artifact, EnsembleObjective, InputSlot, NaiveBayesInput, OpKind,
    Operation, Predicate, TensorDecl, TreeNode, TreeSpec, UnknownPolicy, FORMAT_VERSION,
};
use crate::config::ExportConfig;

/// Build the artifact for a fitted pipeline
///
/// Fails with `SchemaConflict` when two configured slot names coincide or
/// collide with an intermediate tensor name.
pub fn export(pipeline: &FittedPipeline, config: &ExportConfig) -> Result<Artifact> {
    let composer = pipeline.composer();
    if composer.steps().is_empty() {
        return Err(Error::InvalidArgument(
            "cannot export a pipeline without composer steps".into(),
        ));
    }

    let inputs = input_slots(composer.input_columns(), config)?;
    let mut operations = Vec::new();

    for step in composer.steps() {
        let kind = step.transformer().input_kind();
        let slot = inputs
            .iter()
            .find(|s| s.name == slot_name(config, kind))
            .ok_or_else(|| {
                Error::SchemaConflict(format!("no input slot for step '{}'", step.name()))
            })?;

        let indices = step
            .columns()
            .iter()
            .map(|column| {
                slot.columns
                    .iter()
                    .position(|c| c == column)
                    .ok_or_else(|| Error::UnknownColumn(column.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let selected = format!("{}/columns", step.name());
        operations.push(Operation {
            inputs: vec![slot.name.clone()],
            kind: OpKind::SelectColumns { indices },
            outputs: vec![TensorDecl::batch(
                &selected,
                kind.data_type(),
                step.columns().len(),
            )],
        });

        let features = format!("{}/features", step.name());
        operations.push(Operation {
            inputs: vec![selected],
            kind: step_kind(step),
            outputs: vec![TensorDecl::batch(
                &features,
                DataType::Float64,
                step.transformer().n_features_out(),
            )],
        });
    }

    operations.push(Operation {
        inputs: composer
            .steps()
            .iter()
            .map(|s| format!("{}/features", s.name()))
            .collect(),
        kind: OpKind::Concatenate,
        outputs: vec![TensorDecl::batch(
            names::FEATURES,
            DataType::Float64,
            composer.n_features_out(),
        )],
    });

    let estimator = pipeline.estimator();
    let outputs = estimator_outputs(estimator);
    operations.push(Operation {
        inputs: vec![names::FEATURES.to_string()],
        kind: estimator_kind(estimator),
        outputs: outputs.clone(),
    });

    for op in &operations {
        debug!(
            op = op.kind.name(),
            output = %op.outputs[0].name,
            width = ?op.outputs[0].width(),
            "exported operation"
        );
    }

    let artifact = Artifact {
        format_version: FORMAT_VERSION,
        producer: config.producer.clone(),
        inputs,
        operations,
        outputs,
    };
    check_names(&artifact)?;

    info!(
        estimator = estimator.name(),
        inputs = artifact.inputs.len(),
        operations = artifact.operations.len(),
        "exported pipeline"
    );
    Ok(artifact)
}

fn slot_name(config: &ExportConfig, kind: ColumnKind) -> &str {
    match kind {
        ColumnKind::Numeric => &config.numeric_slot,
        ColumnKind::Categorical => &config.categorical_slot,
        ColumnKind::Text => &config.text_slot,
    }
}

/// One slot per kind that has columns, columns in first-reference order
///
/// A string column read both as categories and as text is listed in both
/// slots.
fn input_slots(
    columns: Vec<(String, ColumnKind)>,
    config: &ExportConfig,
) -> Result<Vec<InputSlot>> {
    let mut slot_names = HashSet::new();
    for kind in [ColumnKind::Numeric, ColumnKind::Categorical, ColumnKind::Text] {
        if !slot_names.insert(slot_name(config, kind)) {
            return Err(Error::SchemaConflict(format!(
                "input slot name '{}' is used twice",
                slot_name(config, kind)
            )));
        }
    }

    Ok([ColumnKind::Numeric, ColumnKind::Categorical, ColumnKind::Text]
        .into_iter()
        .filter_map(|kind| {
            let slot_columns: Vec<String> = columns
                .iter()
                .filter(|(_, k)| *k == kind)
                .map(|(name, _)| name.clone())
                .collect();
            (!slot_columns.is_empty()).then(|| InputSlot {
                name: slot_name(config, kind).to_string(),
                element_type: kind.data_type(),
                shape: batch_shape(slot_columns.len()),
                columns: slot_columns,
            })
        })
        .collect())
}

fn policy(handle_unknown: HandleUnknown) -> UnknownPolicy {
    match handle_unknown {
        HandleUnknown::Ignore => UnknownPolicy::Ignore,
        HandleUnknown::Error => UnknownPolicy::Error,
    }
}

fn step_kind(step: &FittedStep) -> OpKind {
    match step.transformer() {
        FittedTransformer::Passthrough(_) => OpKind::Passthrough,
        FittedTransformer::Categorical(encoder) => {
            let categories = encoder.categories().to_vec();
            let handle_unknown = policy(encoder.config().handle_unknown);
            match encoder.config().output {
                CategoricalOutput::OneHot => OpKind::OneHotEncode {
                    categories,
                    handle_unknown,
                },
                CategoricalOutput::Ordinal => OpKind::OrdinalEncode {
                    categories,
                    handle_unknown,
                },
            }
        }
        FittedTransformer::Text(vectorizer) => {
            let config = vectorizer.config();
            OpKind::TokenizeAndCount {
                token_pattern: config.token_pattern.clone(),
                case_sensitive: config.case_sensitive,
                stop_words: config.stop_words.clone(),
                vocabulary: vectorizer.vocabulary().to_vec(),
                idf: vectorizer.idf().map(<[f64]>::to_vec),
            }
        }
    }
}

fn estimator_outputs(estimator: &FittedEstimator) -> Vec<TensorDecl> {
    match estimator.task() {
        Task::Regression => vec![TensorDecl::batch(
            names::PREDICTION,
            DataType::Float64,
            1,
        )],
        Task::BinaryClassification | Task::MulticlassClassification => vec![
            TensorDecl::batch(names::LABEL, DataType::Utf8, 1),
            TensorDecl::batch(
                names::PROBABILITIES,
                DataType::Float64,
                estimator.classes().len(),
            ),
        ],
    }
}

fn estimator_kind(estimator: &FittedEstimator) -> OpKind {
    match estimator {
        FittedEstimator::LinearRegression(lr) => OpKind::LinearRegressor {
            intercept: lr.intercept(),
            coefficients: lr.coefficients().to_vec(),
        },
        FittedEstimator::NaiveBayes(nb) => OpKind::NaiveBayesClassifier {
            classes: nb.classes().to_vec(),
            class_counts: nb.class_counts().to_vec(),
            features: nb
                .features()
                .iter()
                .map(|f| match f {
                    NaiveBayesFeature::Gaussian { means, variances } => NaiveBayesInput::Gaussian {
                        means: means.clone(),
                        variances: variances.clone(),
                    },
                    NaiveBayesFeature::Categorical { probabilities } => {
                        NaiveBayesInput::Categorical {
                            probabilities: probabilities.clone(),
                        }
                    }
                })
                .collect(),
        },
        FittedEstimator::GradientBoosting(gb) => tree_ensemble(gb),
    }
}

fn tree_ensemble(gb: &FittedGradientBoosting) -> OpKind {
    let objective = match gb.objective() {
        Objective::SquaredError => EnsembleObjective::Regression,
        Objective::Logistic => EnsembleObjective::Logistic,
        Objective::Softmax => EnsembleObjective::Softmax,
    };

    let trees = gb
        .trees()
        .iter()
        .map(|boosted| TreeSpec {
            class_index: boosted.class_index,
            nodes: boosted
                .tree
                .nodes()
                .iter()
                .map(|node| match node {
                    Node::Leaf { value } => TreeNode::Leaf { value: *value },
                    Node::Split {
                        feature,
                        condition,
                        left,
                        right,
                    } => {
                        let (predicate, value) = match condition {
                            SplitCondition::LessOrEqual(t) => (Predicate::LessOrEqual, *t),
                            SplitCondition::Equals(c) => (Predicate::Equal, *c),
                        };
                        TreeNode::Branch {
                            feature: *feature,
                            predicate,
                            value,
                            left: *left as usize,
                            right: *right as usize,
                        }
                    }
                })
                .collect(),
        })
        .collect();

    OpKind::TreeEnsemble {
        objective,
        classes: gb.classes().to_vec(),
        base_scores: gb.base_scores().to_vec(),
        trees,
    }
}

/// Slot, intermediate and output names must all be distinct
fn check_names(artifact: &Artifact) -> Result<()> {
    let mut seen = HashSet::new();
    let declared = artifact
        .inputs
        .iter()
        .map(|s| &s.name)
        .chain(
            artifact
                .operations
                .iter()
                .flat_map(|op| op.outputs.iter().map(|o| &o.name)),
        );
    for name in declared {
        if !seen.insert(name.as_str()) {
            return Err(Error::SchemaConflict(format!(
                "tensor name '{name}' is declared twice"
            )));
        }
    }

    let referenced: HashSet<&str> = artifact
        .operations
        .iter()
        .flat_map(|op| op.inputs.iter().map(String::as_str))
        .collect();
    let slots: HashSet<&str> = artifact.inputs.iter().map(|s| s.name.as_str()).collect();
    if !slots.is_subset(&referenced) {
        return Err(Error::SchemaConflict(
            "declared input slots disagree with the slots operations read".into(),
        ));
    }
    Ok(())
}
