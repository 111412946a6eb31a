//! Deterministic encoding, corruption detection and file round trips

use tabex_core::{Column, ColumnSelector, Error, RecordBatch};
use tabex_export::artifact::OpKind;
use tabex_export::{
    export, read_artifact, write_artifact, Artifact, ArtifactFormat, ExportConfig,
    InferenceEngine,
};
use tabex_models::{
    Estimator, FittedPipeline, GradientBoostingConfig, NaiveBayesConfig, Pipeline, Targets,
};
use tabex_transforms::{ColumnComposer, TextVectorizerConfig, Transformer};
use test_case::test_case;

fn reviews() -> RecordBatch {
    RecordBatch::new(vec![
        Column::from_strings(
            "review",
            [
                "fast shipping good price",
                "slow shipping bad box",
                "good price good box",
                "bad price slow reply",
            ],
        ),
        Column::from_strings("store", ["north", "south", "north", "east"]),
        Column::from_f64("stars", vec![5.0, 2.0, 4.0, 1.0]),
    ])
    .unwrap()
}

fn composer() -> ColumnComposer {
    ColumnComposer::new()
        .add(
            "review",
            ColumnSelector::name("review"),
            Transformer::TextVectorizer(TextVectorizerConfig::default().with_max_features(5)),
        )
        .add("store", ColumnSelector::name("store"), Transformer::one_hot())
        .add("stars", ColumnSelector::name("stars"), Transformer::Passthrough)
}

fn fitted(estimator: Estimator) -> FittedPipeline {
    Pipeline::new(composer(), estimator)
        .fit(&reviews(), &Targets::labels(["pos", "neg", "pos", "neg"]))
        .unwrap()
}

fn naive_bayes() -> FittedPipeline {
    fitted(Estimator::NaiveBayes(NaiveBayesConfig::default()))
}

#[test_case(ArtifactFormat::Json ; "json")]
#[test_case(ArtifactFormat::Binary ; "binary")]
fn test_export_is_byte_identical(format: ArtifactFormat) {
    for pipeline in [
        naive_bayes(),
        fitted(Estimator::GradientBoosting(GradientBoostingConfig {
            n_estimators: 5,
            ..GradientBoostingConfig::default()
        })),
    ] {
        let first = export(&pipeline, &ExportConfig::default())
            .unwrap()
            .to_bytes(format)
            .unwrap();
        let second = export(&pipeline, &ExportConfig::default())
            .unwrap()
            .to_bytes(format)
            .unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_refit_exports_identically() {
    let a = export(&naive_bayes(), &ExportConfig::default()).unwrap();
    let b = export(&naive_bayes(), &ExportConfig::default()).unwrap();
    assert_eq!(
        a.to_bytes(ArtifactFormat::Json).unwrap(),
        b.to_bytes(ArtifactFormat::Json).unwrap()
    );
}

#[test_case(ArtifactFormat::Json ; "json")]
#[test_case(ArtifactFormat::Binary ; "binary")]
fn test_file_round_trip(format: ArtifactFormat) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("reviews.{}", format.extension()));
    let artifact = export(&naive_bayes(), &ExportConfig::default()).unwrap();

    write_artifact(&path, &artifact, format).unwrap();
    let loaded = read_artifact(&path, format).unwrap();
    assert_eq!(loaded, artifact);

    let engine = InferenceEngine::new(loaded).unwrap();
    let labels = engine
        .run(&engine.inputs_from_batch(&reviews()).unwrap())
        .unwrap()
        .labels()
        .unwrap();
    assert_eq!(labels.len(), 4);
}

#[test_case(ArtifactFormat::Json ; "json")]
#[test_case(ArtifactFormat::Binary ; "binary")]
fn test_truncated_bytes_rejected(format: ArtifactFormat) {
    let bytes = export(&naive_bayes(), &ExportConfig::default())
        .unwrap()
        .to_bytes(format)
        .unwrap();
    let truncated = &bytes[..bytes.len() / 2];

    assert!(matches!(
        InferenceEngine::from_bytes(truncated, format),
        Err(Error::ArtifactCorrupt(_))
    ));
}

fn tampered(edit: impl FnOnce(&mut Artifact)) -> Error {
    let mut artifact = export(&naive_bayes(), &ExportConfig::default()).unwrap();
    edit(&mut artifact);
    let bytes = artifact.to_bytes(ArtifactFormat::Json).unwrap();
    match InferenceEngine::from_bytes(&bytes, ArtifactFormat::Json) {
        Err(e) => e,
        Ok(_) => panic!("tampered artifact was accepted"),
    }
}

#[test]
fn test_missing_operation_detected() {
    let err = tampered(|a| {
        a.operations
            .retain(|op| !matches!(op.kind, OpKind::Concatenate));
    });
    assert!(matches!(err, Error::ArtifactCorrupt(_)));
}

#[test]
fn test_wrong_vocabulary_width_detected() {
    let err = tampered(|a| {
        for op in &mut a.operations {
            if let OpKind::TokenizeAndCount { vocabulary, .. } = &mut op.kind {
                vocabulary.push("extra".to_string());
            }
        }
    });
    assert!(matches!(err, Error::ArtifactCorrupt(_)));
}

#[test]
fn test_bad_token_pattern_detected() {
    let err = tampered(|a| {
        for op in &mut a.operations {
            if let OpKind::TokenizeAndCount { token_pattern, .. } = &mut op.kind {
                *token_pattern = "(".to_string();
            }
        }
    });
    assert!(matches!(err, Error::ArtifactCorrupt(_)));
}

#[test]
fn test_renamed_output_detected() {
    let err = tampered(|a| a.outputs[0].name = "verdict".to_string());
    assert!(matches!(err, Error::ArtifactCorrupt(_)));
}

#[test]
fn test_conflicting_slot_names_rejected() {
    let config = ExportConfig {
        categorical_slot: "text_input".to_string(),
        ..ExportConfig::default()
    };
    assert!(matches!(
        export(&naive_bayes(), &config),
        Err(Error::SchemaConflict(_))
    ));
}

#[test]
fn test_slot_colliding_with_intermediate_rejected() {
    let config = ExportConfig {
        numeric_slot: "features".to_string(),
        ..ExportConfig::default()
    };
    assert!(matches!(
        export(&naive_bayes(), &config),
        Err(Error::SchemaConflict(_))
    ));
}

#[test]
fn test_engine_rejects_wrong_slot_width() {
    let engine = InferenceEngine::new(export(&naive_bayes(), &ExportConfig::default()).unwrap())
        .unwrap();
    let mut inputs = engine.inputs_from_batch(&reviews()).unwrap();
    inputs.insert(
        "numeric_input",
        tabex_export::Tensor::float64(4, 2, vec![0.0; 8]).unwrap(),
    );

    assert!(matches!(
        engine.run(&inputs),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_engine_rejects_short_tensor() {
    let engine = InferenceEngine::new(export(&naive_bayes(), &ExportConfig::default()).unwrap())
        .unwrap();
    let mut inputs = engine.inputs_from_batch(&reviews()).unwrap();
    inputs.insert(
        "numeric_input",
        tabex_export::Tensor::Float64 {
            n_rows: 4,
            n_cols: 1,
            data: vec![1.0],
        },
    );

    assert!(matches!(
        engine.run(&inputs),
        Err(Error::ShapeMismatch { .. })
    ));
}
