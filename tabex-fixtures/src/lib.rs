//! Reference fixtures for artifact runtimes
//!
//! Fits a fixed set of pipelines on small built-in datasets, exports each
//! one, and writes the artifact next to the inputs it was scored on and the
//! predictions the training-side pipeline produced. An independent runtime
//! passes when it reproduces every `.expected.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tabex_core::{Column, ColumnData, ColumnSelector, Error, RecordBatch, Result};
use tabex_export::io::write_atomic;
use tabex_export::{
    export, to_pmml, write_artifact, ArtifactFormat, ExportConfig, InferenceEngine, PmmlConfig,
};
use tabex_models::{
    Estimator, FittedPipeline, GradientBoostingConfig, LinearRegressionConfig, NaiveBayesConfig,
    Pipeline, Targets,
};
use tabex_transforms::{
    CategoricalEncoderConfig, ColumnComposer, HandleUnknown, TextVectorizerConfig, Transformer,
};
use tracing::{debug, info};

/// Largest relative disagreement tolerated between pipeline and engine
const TOLERANCE: f64 = 1e-9;

/// Generator options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Encodings to write for every fixture
    pub formats: Vec<ArtifactFormat>,

    /// Fixture names to generate; empty means all
    pub only: Vec<String>,

    /// Boosting options for the tree-ensemble fixtures
    pub gradient_boosting: GradientBoostingConfig,

    /// Slot names and producer
    pub export: ExportConfig,

    /// PMML header and target name
    pub pmml: PmmlConfig,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            formats: vec![ArtifactFormat::Json, ArtifactFormat::Binary],
            only: Vec::new(),
            gradient_boosting: GradientBoostingConfig {
                n_estimators: 25,
                ..GradientBoostingConfig::default()
            },
            export: ExportConfig::default(),
            pmml: PmmlConfig::default(),
        }
    }
}

impl FixtureConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

/// Files written for one fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFixture {
    /// Fixture name
    pub name: String,
    /// Paths written
    pub files: Vec<PathBuf>,
}

/// Scored inputs and the predictions a runtime must reproduce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expected {
    /// Fixture name
    pub fixture: String,
    /// Input columns, in batch order
    pub columns: Vec<ExpectedColumn>,
    /// Regression outputs
    pub prediction: Option<Vec<f64>>,
    /// Predicted labels
    pub labels: Option<Vec<String>>,
    /// Class probabilities per row
    pub probabilities: Option<Vec<Vec<f64>>>,
}

/// One scored input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedColumn {
    /// Numeric column
    Float64 {
        /// Column name
        name: String,
        /// Values
        values: Vec<f64>,
    },
    /// String column
    Utf8 {
        /// Column name
        name: String,
        /// Values
        values: Vec<String>,
    },
}

impl From<&Column> for ExpectedColumn {
    fn from(column: &Column) -> Self {
        let name = column.name().to_string();
        match column.data() {
            ColumnData::Float64(values) => Self::Float64 {
                name,
                values: values.clone(),
            },
            ColumnData::Utf8(values) => Self::Utf8 {
                name,
                values: values.clone(),
            },
        }
    }
}

/// A pipeline to fit, its training data and the batch it is scored on
struct Fixture {
    name: &'static str,
    pipeline: Pipeline,
    train: RecordBatch,
    targets: Targets,
    query: RecordBatch,
}

/// Every built-in fixture name
pub fn fixture_names() -> Vec<&'static str> {
    vec![
        "linear_regression",
        "naive_bayes",
        "gbdt_regression",
        "gbdt_binary",
        "gbdt_multiclass",
        "text_regression",
        "text_classification",
    ]
}

/// Fit, export and write every selected fixture into `out_dir`
pub fn generate(config: &FixtureConfig, out_dir: &Path) -> Result<Vec<GeneratedFixture>> {
    if let Some(unknown) = config
        .only
        .iter()
        .find(|name| !fixture_names().iter().any(|known| *known == name.as_str()))
    {
        return Err(Error::InvalidArgument(format!("unknown fixture '{unknown}'")));
    }
    fs::create_dir_all(out_dir)?;

    let mut generated = Vec::new();
    for fixture in fixtures(config)? {
        if !config.only.is_empty() && !config.only.iter().any(|n| n == fixture.name) {
            continue;
        }
        generated.push(write_fixture(&fixture, config, out_dir)?);
    }

    info!(
        fixtures = generated.len(),
        out_dir = %out_dir.display(),
        "generated fixtures"
    );
    Ok(generated)
}

fn write_fixture(
    fixture: &Fixture,
    config: &FixtureConfig,
    out_dir: &Path,
) -> Result<GeneratedFixture> {
    let fitted = fixture.pipeline.fit(&fixture.train, &fixture.targets)?;
    let artifact = export(&fitted, &config.export)?;
    let mut files = Vec::new();

    for &format in &config.formats {
        let path = out_dir.join(format!("{}.{}", fixture.name, format.extension()));
        write_artifact(&path, &artifact, format)?;
        files.push(path);
    }

    match to_pmml(&fitted, &config.pmml) {
        Ok(document) => {
            let path = out_dir.join(format!("{}.pmml", fixture.name));
            write_atomic(&path, document.as_bytes())?;
            files.push(path);
        }
        Err(e @ (Error::UnsupportedEstimator(_) | Error::UnsupportedTransformer(_))) => {
            debug!(fixture = fixture.name, reason = %e, "skipping PMML");
        }
        Err(e) => return Err(e),
    }

    let expected = expected(fixture, &fitted)?;
    check_engine(fixture.name, &InferenceEngine::new(artifact)?, &fixture.query, &expected)?;

    let path = out_dir.join(format!("{}.expected.json", fixture.name));
    write_atomic(&path, &serde_json::to_vec_pretty(&expected)?)?;
    files.push(path);

    debug!(fixture = fixture.name, files = files.len(), "wrote fixture");
    Ok(GeneratedFixture {
        name: fixture.name.to_string(),
        files,
    })
}

fn expected(fixture: &Fixture, fitted: &FittedPipeline) -> Result<Expected> {
    let predictions = fitted.predict(&fixture.query)?;
    let probabilities = if fitted.estimator().task().is_classification() {
        Some(fitted.predict_proba(&fixture.query)?)
    } else {
        None
    };

    Ok(Expected {
        fixture: fixture.name.to_string(),
        columns: fixture.query.columns().iter().map(ExpectedColumn::from).collect(),
        prediction: predictions.values().map(<[f64]>::to_vec),
        labels: predictions.labels().map(<[String]>::to_vec),
        probabilities,
    })
}

/// Score the query through the artifact and compare against the pipeline
fn check_engine(
    name: &str,
    engine: &InferenceEngine,
    query: &RecordBatch,
    expected: &Expected,
) -> Result<()> {
    let outputs = engine.run(&engine.inputs_from_batch(query)?)?;
    let disagree = |what: &str| {
        Error::InvalidOperation(format!("fixture '{name}': engine {what} disagree with pipeline"))
    };

    if let Some(values) = &expected.prediction {
        if !all_close(&outputs.prediction()?, values) {
            return Err(disagree("predictions"));
        }
    }
    if let Some(labels) = &expected.labels {
        if &outputs.labels()? != labels {
            return Err(disagree("labels"));
        }
    }
    if let Some(rows) = &expected.probabilities {
        let actual = outputs.probabilities()?;
        if actual.len() != rows.len() || actual.iter().zip(rows).any(|(a, e)| !all_close(a, e)) {
            return Err(disagree("probabilities"));
        }
    }
    Ok(())
}

fn all_close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= TOLERANCE * x.abs().max(y.abs()).max(1.0))
}

/// Houses: bedrooms, bathrooms, state, color and price
pub fn houses() -> Result<RecordBatch> {
    RecordBatch::new(vec![
        Column::from_f64(
            "bedrooms",
            vec![1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0],
        ),
        Column::from_f64(
            "bathrooms",
            vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 4.0],
        ),
        Column::from_strings(
            "state",
            ["CA", "NY", "CA", "TX", "NY", "CA", "TX", "NY", "CA", "TX"],
        ),
        Column::from_strings(
            "color",
            ["red", "blue", "green", "red", "blue", "green", "red", "blue", "green", "red"],
        ),
        Column::from_f64(
            "price",
            vec![
                120.0, 165.0, 210.0, 205.0, 270.0, 300.0, 310.0, 385.0, 450.0, 470.0,
            ],
        ),
    ])
}

/// Houses plus rows carrying categories never seen in training
fn houses_query() -> Result<RecordBatch> {
    RecordBatch::new(vec![
        Column::from_f64("bedrooms", vec![1.0, 3.0, 5.0, 2.0, 4.0]),
        Column::from_f64("bathrooms", vec![1.0, 2.0, 3.0, 1.0, 2.0]),
        Column::from_strings("state", ["CA", "NY", "TX", "WA", "OR"]),
        Column::from_strings("color", ["red", "blue", "green", "purple", "red"]),
    ])
}

/// Messages: free text with a tag and a sentiment score
pub fn messages() -> Result<RecordBatch> {
    RecordBatch::new(vec![
        Column::from_strings(
            "text",
            [
                "Great product, arrived fast",
                "Terrible. Broke after one day",
                "great support and fast replies",
                "awful packaging; item broke",
                "works as described, great value",
                "slow shipping and awful support",
                "Fast, cheap, great",
                "broke again, terrible quality",
            ],
        ),
        Column::from_strings(
            "tag",
            [
                "praise",
                "complaint",
                "praise",
                "complaint",
                "praise",
                "complaint",
                "praise",
                "complaint",
            ],
        ),
        Column::from_f64("score", vec![5.0, 1.0, 5.0, 1.0, 4.0, 2.0, 5.0, 1.0]),
    ])
}

fn messages_query() -> Result<RecordBatch> {
    RecordBatch::new(vec![Column::from_strings(
        "text",
        ["GREAT value", "it broke", "nothing familiar here", ""],
    )])
}

fn price_tier(price: f64) -> &'static str {
    if price < 200.0 {
        "budget"
    } else if price < 350.0 {
        "standard"
    } else {
        "premium"
    }
}

fn fixtures(config: &FixtureConfig) -> Result<Vec<Fixture>> {
    let houses = houses()?;
    let price = houses.column_by_name("price")?.as_f64()?.to_vec();
    let tiers = Targets::labels(price.iter().map(|&p| price_tier(p)));
    let pricey = Targets::labels(price.iter().map(|&p| if p >= 300.0 { "yes" } else { "no" }));

    let messages = messages()?;
    let score = messages.column_by_name("score")?.as_f64()?.to_vec();
    let tags = Targets::Labels(messages.column_by_name("tag")?.as_utf8()?.to_vec());

    let one_hot_state = ColumnComposer::new()
        .add(
            "rooms",
            ColumnSelector::names(&["bedrooms", "bathrooms"]),
            Transformer::Passthrough,
        )
        .add("state", ColumnSelector::name("state"), Transformer::one_hot());
    let native_state = ColumnComposer::new()
        .add(
            "rooms",
            ColumnSelector::names(&["bedrooms", "bathrooms"]),
            Transformer::Passthrough,
        )
        .add(
            "state",
            ColumnSelector::name("state"),
            Transformer::CategoricalEncoder(CategoricalEncoderConfig::ordinal(
                HandleUnknown::Ignore,
            )),
        )
        .add("color", ColumnSelector::name("color"), Transformer::one_hot());
    let words = ColumnComposer::new().add(
        "text",
        ColumnSelector::name("text"),
        Transformer::TextVectorizer(TextVectorizerConfig::default().with_max_features(12)),
    );
    let boosting = Estimator::GradientBoosting(config.gradient_boosting.clone());

    let house = |name, composer: &ColumnComposer, estimator, targets| -> Result<Fixture> {
        Ok(Fixture {
            name,
            pipeline: Pipeline::new(composer.clone(), estimator),
            train: houses.clone(),
            targets,
            query: houses_query()?,
        })
    };
    let message = |name, estimator, targets| -> Result<Fixture> {
        Ok(Fixture {
            name,
            pipeline: Pipeline::new(words.clone(), estimator),
            train: messages.clone(),
            targets,
            query: messages_query()?,
        })
    };

    Ok(vec![
        house(
            "linear_regression",
            &one_hot_state,
            Estimator::LinearRegression(LinearRegressionConfig::default()),
            Targets::Numeric(price.clone()),
        )?,
        house(
            "naive_bayes",
            &native_state,
            Estimator::NaiveBayes(NaiveBayesConfig::default()),
            tiers.clone(),
        )?,
        house(
            "gbdt_regression",
            &native_state,
            boosting.clone(),
            Targets::Numeric(price),
        )?,
        house("gbdt_binary", &native_state, boosting.clone(), pricey)?,
        house("gbdt_multiclass", &native_state, boosting, tiers)?,
        message(
            "text_regression",
            Estimator::LinearRegression(LinearRegressionConfig::default()),
            Targets::Numeric(score),
        )?,
        message(
            "text_classification",
            Estimator::NaiveBayes(NaiveBayesConfig::default()),
            tags,
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_every_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let generated = generate(&FixtureConfig::default(), dir.path()).unwrap();

        let names: Vec<_> = generated.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, fixture_names());
        assert!(dir.path().join("linear_regression.json").exists());
        assert!(dir.path().join("linear_regression.bin").exists());
        assert!(dir.path().join("linear_regression.pmml").exists());
        assert!(dir.path().join("naive_bayes.pmml").exists());
        for name in ["gbdt_regression", "gbdt_binary", "gbdt_multiclass"] {
            let pmml = fs::read_to_string(dir.path().join(format!("{name}.pmml"))).unwrap();
            assert!(pmml.contains("<MiningModel"), "{name}");
        }

        let expected: Expected = serde_json::from_slice(
            &fs::read(dir.path().join("gbdt_multiclass.expected.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(expected.labels.as_ref().map(Vec::len), Some(5));
        assert!(expected.probabilities.unwrap().iter().all(|p| p.len() == 3));
    }

    #[test]
    fn test_only_selected_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let config = FixtureConfig {
            formats: vec![ArtifactFormat::Json],
            only: vec!["text_regression".to_string()],
            ..FixtureConfig::default()
        };
        let generated = generate(&config, dir.path()).unwrap();

        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].files.len(), 3);
    }

    #[test]
    fn test_unknown_fixture_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = FixtureConfig {
            only: vec!["svm".to_string()],
            ..FixtureConfig::default()
        };
        assert!(matches!(
            generate(&config, dir.path()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let json = r#"{"formats": ["binary"], "gradient_boosting": {"n_estimators": 3}}"#;
        let config: FixtureConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.formats, vec![ArtifactFormat::Binary]);
        assert_eq!(config.gradient_boosting.n_estimators, 3);
        assert_eq!(config.export, ExportConfig::default());
    }
}
