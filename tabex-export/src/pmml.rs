//! PMML 4.4 export
//!
//! Linear regression maps to a `RegressionModel` and naive Bayes to a
//! `NaiveBayesModel`. Tree ensembles become a `MiningModel` summing one
//! `TreeModel` segment per tree plus a constant segment for the base score;
//! classifiers chain that sum into a `RegressionModel` that applies the
//! sigmoid or softmax. Text blocks become `TextIndex` functions evaluated per
//! vocabulary token. TF-IDF weighting and ordinal codes feeding a linear
//! model have no faithful mapping and are rejected.

use std::collections::HashMap;
use std::fmt::Display;

use tabex_core::{ColumnKind, Error, Result};
use tabex_models::naive_bayes::category_code;
use tabex_models::{
    FittedEstimator, FittedGradientBoosting, FittedLinearRegression, FittedNaiveBayes,
    FittedPipeline, NaiveBayesFeature, Node, Objective, SplitCondition, Tree,
};
use tabex_transforms::{
    CategoricalOutput, FittedComposer, FittedTextVectorizer, FittedTransformer, TermWeighting,
};
use tracing::debug;

use crate::config::PmmlConfig;

const NAMESPACE: &str = "http://www.dmg.org/PMML-4_4";

/// Where one column of the feature matrix comes from
#[derive(Debug, Clone, PartialEq)]
enum Feature {
    Numeric {
        column: String,
    },
    OneHot {
        column: String,
        category: String,
    },
    Ordinal {
        column: String,
        categories: Vec<String>,
    },
    Token {
        column: String,
        token: String,
    },
}

impl Feature {
    /// Field name the model refers to
    fn field(&self) -> String {
        match self {
            Self::Numeric { column } | Self::Ordinal { column, .. } => column.clone(),
            Self::OneHot { column, category } => format!("{column}={category}"),
            Self::Token { column, token } => format!("{column}({token})"),
        }
    }
}

/// Render a fitted pipeline as a PMML document
pub fn to_pmml(pipeline: &FittedPipeline, config: &PmmlConfig) -> Result<String> {
    let composer = pipeline.composer();
    let features = features(composer)?;

    let mut xml = XmlWriter::new();
    xml.declaration();
    xml.open("PMML", &[("version", "4.4".to_string()), ("xmlns", NAMESPACE.to_string())]);
    xml.open("Header", &[]);
    xml.empty(
        "Application",
        &[
            ("name", config.application.clone()),
            ("version", config.application_version.clone()),
        ],
    );
    xml.close("Header");

    match pipeline.estimator() {
        FittedEstimator::LinearRegression(lr) => {
            if let Some(Feature::Ordinal { column, .. }) =
                features.iter().find(|f| matches!(f, Feature::Ordinal { .. }))
            {
                return Err(Error::UnsupportedTransformer(format!(
                    "ordinal codes for '{column}' cannot feed a PMML regression model"
                )));
            }
            data_dictionary(&mut xml, composer, config, None)?;
            transformation_dictionary(&mut xml, composer);
            regression_model(&mut xml, lr, &features, composer, config);
        }
        FittedEstimator::NaiveBayes(nb) => {
            data_dictionary(&mut xml, composer, config, Some(nb.classes()))?;
            transformation_dictionary(&mut xml, composer);
            naive_bayes_model(&mut xml, nb, &features, composer, config);
        }
        FittedEstimator::GradientBoosting(gb) => {
            if gb.n_features_in() != features.len() {
                return Err(Error::shape(
                    format!("{} ensemble features", gb.n_features_in()),
                    format!("{} composer features", features.len()),
                ));
            }
            let classes = match gb.objective() {
                Objective::SquaredError => None,
                Objective::Logistic | Objective::Softmax => Some(gb.classes()),
            };
            data_dictionary(&mut xml, composer, config, classes)?;
            transformation_dictionary(&mut xml, composer);
            mining_model(&mut xml, gb, &features, composer, config)?;
        }
    }

    xml.close("PMML");
    debug!(features = features.len(), "rendered PMML");
    Ok(xml.finish())
}

/// One entry per feature matrix column, in composer order
fn features(composer: &FittedComposer) -> Result<Vec<Feature>> {
    let mut features = Vec::new();
    for step in composer.steps() {
        match step.transformer() {
            FittedTransformer::Passthrough(_) => {
                features.extend(step.columns().iter().map(|column| Feature::Numeric {
                    column: column.clone(),
                }));
            }
            FittedTransformer::Categorical(encoder) => {
                let column = encoder.column().to_string();
                match encoder.config().output {
                    CategoricalOutput::OneHot => {
                        features.extend(encoder.categories().iter().map(|category| {
                            Feature::OneHot {
                                column: column.clone(),
                                category: category.clone(),
                            }
                        }));
                    }
                    CategoricalOutput::Ordinal => features.push(Feature::Ordinal {
                        column,
                        categories: encoder.categories().to_vec(),
                    }),
                }
            }
            FittedTransformer::Text(vectorizer) => {
                if vectorizer.config().weighting == TermWeighting::TfIdf {
                    return Err(Error::UnsupportedTransformer(format!(
                        "TF-IDF weighting for '{}' has no PMML equivalent",
                        vectorizer.column()
                    )));
                }
                features.extend(vectorizer.vocabulary().iter().map(|token| Feature::Token {
                    column: vectorizer.column().to_string(),
                    token: token.clone(),
                }));
            }
        }
    }
    Ok(features)
}

fn text_steps(composer: &FittedComposer) -> impl Iterator<Item = &FittedTextVectorizer> {
    composer.steps().iter().filter_map(|step| match step.transformer() {
        FittedTransformer::Text(vectorizer) => Some(vectorizer),
        _ => None,
    })
}

fn data_dictionary(
    xml: &mut XmlWriter,
    composer: &FittedComposer,
    config: &PmmlConfig,
    classes: Option<&[String]>,
) -> Result<()> {
    let columns = composer.input_columns();
    let mut kinds: HashMap<&str, ColumnKind> = HashMap::new();
    for (name, kind) in &columns {
        if let Some(previous) = kinds.insert(name, *kind) {
            return Err(Error::SchemaConflict(format!(
                "column '{name}' is used as both {previous} and {kind}"
            )));
        }
    }

    xml.open(
        "DataDictionary",
        &[("numberOfFields", (columns.len() + 1).to_string())],
    );
    match classes {
        Some(classes) => categorical_field(xml, &config.target, classes),
        None => xml.empty(
            "DataField",
            &[
                ("name", config.target.clone()),
                ("optype", "continuous".to_string()),
                ("dataType", "double".to_string()),
            ],
        ),
    }

    for (name, kind) in &columns {
        match kind {
            ColumnKind::Numeric => xml.empty(
                "DataField",
                &[
                    ("name", name.clone()),
                    ("optype", "continuous".to_string()),
                    ("dataType", "double".to_string()),
                ],
            ),
            ColumnKind::Categorical => {
                let mut values = categories_of(composer, name);
                values.sort();
                categorical_field(xml, name, &values);
            }
            ColumnKind::Text => xml.empty(
                "DataField",
                &[
                    ("name", name.clone()),
                    ("optype", "categorical".to_string()),
                    ("dataType", "string".to_string()),
                ],
            ),
        }
    }
    xml.close("DataDictionary");
    Ok(())
}

fn categorical_field(xml: &mut XmlWriter, name: &str, values: &[String]) {
    xml.open(
        "DataField",
        &[
            ("name", name.to_string()),
            ("optype", "categorical".to_string()),
            ("dataType", "string".to_string()),
        ],
    );
    for value in values {
        xml.empty("Value", &[("value", value.clone())]);
    }
    xml.close("DataField");
}

fn categories_of(composer: &FittedComposer, column: &str) -> Vec<String> {
    composer
        .steps()
        .iter()
        .find_map(|step| match step.transformer() {
            FittedTransformer::Categorical(encoder) if encoder.column() == column => {
                Some(encoder.categories().to_vec())
            }
            _ => None,
        })
        .unwrap_or_default()
}

fn transformation_dictionary(xml: &mut XmlWriter, composer: &FittedComposer) {
    if text_steps(composer).next().is_none() {
        return;
    }

    xml.open("TransformationDictionary", &[]);
    for vectorizer in text_steps(composer) {
        let config = vectorizer.config();
        xml.open(
            "DefineFunction",
            &[
                ("name", format!("{}Transform", vectorizer.column())),
                ("optype", "continuous".to_string()),
            ],
        );
        xml.empty("ParameterField", &[("name", "text".to_string())]);
        xml.empty("ParameterField", &[("name", "term".to_string())]);
        xml.open(
            "TextIndex",
            &[
                ("textField", "text".to_string()),
                ("localTermWeights", "termFrequency".to_string()),
                ("wordSeparatorCharacterRE", config.token_pattern.clone()),
                ("isCaseSensitive", config.case_sensitive.to_string()),
            ],
        );
        xml.empty("FieldRef", &[("field", "term".to_string())]);
        xml.close("TextIndex");
        xml.close("DefineFunction");
    }
    xml.close("TransformationDictionary");
}

fn mining_schema(xml: &mut XmlWriter, composer: &FittedComposer, config: &PmmlConfig) {
    xml.open("MiningSchema", &[]);
    xml.empty(
        "MiningField",
        &[
            ("name", config.target.clone()),
            ("usageType", "target".to_string()),
        ],
    );
    for (name, _) in composer.input_columns() {
        xml.empty("MiningField", &[("name", name)]);
    }
    xml.close("MiningSchema");
}

/// Derived fields for tokens, and for one-hot indicators when `one_hot`
fn local_transformations(xml: &mut XmlWriter, features: &[Feature], one_hot: bool) {
    let derived: Vec<&Feature> = features
        .iter()
        .filter(|f| match f {
            Feature::Token { .. } => true,
            Feature::OneHot { .. } => one_hot,
            Feature::Numeric { .. } | Feature::Ordinal { .. } => false,
        })
        .collect();
    if derived.is_empty() {
        return;
    }

    xml.open("LocalTransformations", &[]);
    for feature in derived {
        match feature {
            Feature::Token { column, token } => {
                xml.open(
                    "DerivedField",
                    &[
                        ("name", feature.field()),
                        ("optype", "continuous".to_string()),
                        ("dataType", "integer".to_string()),
                    ],
                );
                xml.open("Apply", &[("function", format!("{column}Transform"))]);
                xml.empty("FieldRef", &[("field", column.clone())]);
                xml.text("Constant", &[], token);
                xml.close("Apply");
            }
            Feature::OneHot { column, category } => {
                xml.open(
                    "DerivedField",
                    &[
                        ("name", feature.field()),
                        ("optype", "continuous".to_string()),
                        ("dataType", "double".to_string()),
                    ],
                );
                xml.empty(
                    "NormDiscrete",
                    &[("field", column.clone()), ("value", category.clone())],
                );
            }
            Feature::Numeric { .. } | Feature::Ordinal { .. } => continue,
        }
        xml.close("DerivedField");
    }
    xml.close("LocalTransformations");
}

fn regression_model(
    xml: &mut XmlWriter,
    lr: &FittedLinearRegression,
    features: &[Feature],
    composer: &FittedComposer,
    config: &PmmlConfig,
) {
    xml.open(
        "RegressionModel",
        &[("functionName", "regression".to_string())],
    );
    mining_schema(xml, composer, config);
    local_transformations(xml, features, false);

    xml.open("RegressionTable", &[("intercept", num(lr.intercept()))]);
    for (feature, &coefficient) in features.iter().zip(lr.coefficients()) {
        match feature {
            Feature::OneHot { column, category } => xml.empty(
                "CategoricalPredictor",
                &[
                    ("name", column.clone()),
                    ("value", category.clone()),
                    ("coefficient", num(coefficient)),
                ],
            ),
            _ => xml.empty(
                "NumericPredictor",
                &[("name", feature.field()), ("coefficient", num(coefficient))],
            ),
        }
    }
    xml.close("RegressionTable");
    xml.close("RegressionModel");
}

fn naive_bayes_model(
    xml: &mut XmlWriter,
    nb: &FittedNaiveBayes,
    features: &[Feature],
    composer: &FittedComposer,
    config: &PmmlConfig,
) {
    let classes = nb.classes();
    xml.open(
        "NaiveBayesModel",
        &[
            ("functionName", "classification".to_string()),
            ("threshold", "0.001".to_string()),
        ],
    );
    mining_schema(xml, composer, config);
    local_transformations(xml, features, true);

    xml.open("BayesInputs", &[]);
    for (feature, likelihood) in features.iter().zip(nb.features()) {
        xml.open("BayesInput", &[("fieldName", feature.field())]);
        match likelihood {
            NaiveBayesFeature::Gaussian { means, variances } => {
                xml.open("TargetValueStats", &[]);
                for (c, class) in classes.iter().enumerate() {
                    xml.open("TargetValueStat", &[("value", class.clone())]);
                    xml.empty(
                        "GaussianDistribution",
                        &[("mean", num(means[c])), ("variance", num(variances[c]))],
                    );
                    xml.close("TargetValueStat");
                }
                xml.close("TargetValueStats");
            }
            NaiveBayesFeature::Categorical { probabilities } => {
                let categories: &[String] = match feature {
                    Feature::Ordinal { categories, .. } => categories,
                    _ => &[],
                };
                // Fractional counts reproduce the smoothed probabilities exactly
                for (code, category) in categories.iter().enumerate() {
                    xml.open("PairCounts", &[("value", category.clone())]);
                    xml.open("TargetValueCounts", &[]);
                    for (c, class) in classes.iter().enumerate() {
                        let p = probabilities[c].get(code).copied().unwrap_or(0.0);
                        xml.empty(
                            "TargetValueCount",
                            &[
                                ("value", class.clone()),
                                ("count", num(p * nb.class_counts()[c])),
                            ],
                        );
                    }
                    xml.close("TargetValueCounts");
                    xml.close("PairCounts");
                }
            }
        }
        xml.close("BayesInput");
    }
    xml.close("BayesInputs");

    xml.open("BayesOutput", &[("fieldName", config.target.clone())]);
    xml.open("TargetValueCounts", &[]);
    for (class, &count) in classes.iter().zip(nb.class_counts()) {
        xml.empty(
            "TargetValueCount",
            &[("value", class.clone()), ("count", num(count))],
        );
    }
    xml.close("TargetValueCounts");
    xml.close("BayesOutput");
    xml.close("NaiveBayesModel");
}

/// Names of the intermediate scores passed along a model chain
const RAW_SCORE: &str = "rawScore";
const TRANSFORMED_SCORE: &str = "transformedScore";

fn mining_model(
    xml: &mut XmlWriter,
    gb: &FittedGradientBoosting,
    features: &[Feature],
    composer: &FittedComposer,
    config: &PmmlConfig,
) -> Result<()> {
    let function = match gb.objective() {
        Objective::SquaredError => "regression",
        Objective::Logistic | Objective::Softmax => "classification",
    };
    xml.open(
        "MiningModel",
        &[
            ("functionName", function.to_string()),
            ("algorithmName", "GradientBoosting".to_string()),
        ],
    );
    mining_schema(xml, composer, config);
    local_transformations(xml, features, true);

    match gb.objective() {
        Objective::SquaredError => {
            tree_sum(xml, base_score(gb, 0)?, class_trees(gb, 0), features)?;
        }
        Objective::Logistic => logistic_chain(xml, gb, features, composer, config)?,
        Objective::Softmax => softmax_chain(xml, gb, features, composer, config)?,
    }

    xml.close("MiningModel");
    Ok(())
}

/// Sum the trees, squash through a sigmoid, then split into two classes
fn logistic_chain(
    xml: &mut XmlWriter,
    gb: &FittedGradientBoosting,
    features: &[Feature],
    composer: &FittedComposer,
    config: &PmmlConfig,
) -> Result<()> {
    let classes = gb.classes();
    let [negative, positive] = classes else {
        return Err(Error::InvalidOperation(format!(
            "logistic ensemble with {} classes",
            classes.len()
        )));
    };
    xml.open("Segmentation", &[("multipleModelMethod", "modelChain".to_string())]);

    xml.open("Segment", &[("id", "1".to_string())]);
    xml.empty("True", &[]);
    xml.open("MiningModel", &[("functionName", "regression".to_string())]);
    input_schema(xml, composer);
    xml.open("Output", &[]);
    xml.empty("OutputField", &score_field(RAW_SCORE, "predictedValue"));
    xml.open("OutputField", &score_field(TRANSFORMED_SCORE, "transformedValue"));
    sigmoid(xml, RAW_SCORE);
    xml.close("OutputField");
    xml.close("Output");
    tree_sum(xml, base_score(gb, 0)?, class_trees(gb, 0), features)?;
    xml.close("MiningModel");
    xml.close("Segment");

    // The last table is one minus the first
    xml.open("Segment", &[("id", "2".to_string())]);
    xml.empty("True", &[]);
    chained_classifier(xml, config, classes, "none", &[TRANSFORMED_SCORE.to_string()]);
    xml.open(
        "RegressionTable",
        &[("intercept", "0".to_string()), ("targetCategory", positive.clone())],
    );
    xml.empty(
        "NumericPredictor",
        &[("name", TRANSFORMED_SCORE.to_string()), ("coefficient", "1".to_string())],
    );
    xml.close("RegressionTable");
    xml.empty(
        "RegressionTable",
        &[("intercept", "0".to_string()), ("targetCategory", negative.clone())],
    );
    xml.close("RegressionModel");
    xml.close("Segment");

    xml.close("Segmentation");
    Ok(())
}

/// One tree sum per class, then a softmax over the sums
fn softmax_chain(
    xml: &mut XmlWriter,
    gb: &FittedGradientBoosting,
    features: &[Feature],
    composer: &FittedComposer,
    config: &PmmlConfig,
) -> Result<()> {
    let classes = gb.classes();
    let scores: Vec<String> = classes.iter().map(|c| format!("{RAW_SCORE}({c})")).collect();
    xml.open("Segmentation", &[("multipleModelMethod", "modelChain".to_string())]);

    for (k, score) in scores.iter().enumerate() {
        xml.open("Segment", &[("id", (k + 1).to_string())]);
        xml.empty("True", &[]);
        xml.open("MiningModel", &[("functionName", "regression".to_string())]);
        input_schema(xml, composer);
        xml.open("Output", &[]);
        xml.empty("OutputField", &score_field(score, "predictedValue"));
        xml.close("Output");
        tree_sum(xml, base_score(gb, k)?, class_trees(gb, k), features)?;
        xml.close("MiningModel");
        xml.close("Segment");
    }

    xml.open("Segment", &[("id", (classes.len() + 1).to_string())]);
    xml.empty("True", &[]);
    chained_classifier(xml, config, classes, "softmax", &scores);
    for (class, score) in classes.iter().zip(&scores) {
        xml.open(
            "RegressionTable",
            &[("intercept", "0".to_string()), ("targetCategory", class.clone())],
        );
        xml.empty(
            "NumericPredictor",
            &[("name", score.clone()), ("coefficient", "1".to_string())],
        );
        xml.close("RegressionTable");
    }
    xml.close("RegressionModel");
    xml.close("Segment");

    xml.close("Segmentation");
    Ok(())
}

fn base_score(gb: &FittedGradientBoosting, k: usize) -> Result<f64> {
    gb.base_scores()
        .get(k)
        .copied()
        .ok_or_else(|| Error::InvalidOperation(format!("no base score for output {k}")))
}

fn class_trees(gb: &FittedGradientBoosting, k: usize) -> impl Iterator<Item = &Tree> {
    gb.trees()
        .iter()
        .filter(move |boosted| boosted.class_index == k)
        .map(|boosted| &boosted.tree)
}

/// Mining schema of a nested model: every input, no target
fn input_schema(xml: &mut XmlWriter, composer: &FittedComposer) {
    xml.open("MiningSchema", &[]);
    for (name, _) in composer.input_columns() {
        xml.empty("MiningField", &[("name", name)]);
    }
    xml.close("MiningSchema");
}

fn score_field(name: &str, feature: &str) -> [(&'static str, String); 5] {
    [
        ("name", name.to_string()),
        ("optype", "continuous".to_string()),
        ("dataType", "double".to_string()),
        ("feature", feature.to_string()),
        ("isFinalResult", "false".to_string()),
    ]
}

/// `1 / (1 + exp(-field))`
fn sigmoid(xml: &mut XmlWriter, field: &str) {
    let double = || [("dataType", "double".to_string())];
    xml.open("Apply", &[("function", "/".to_string())]);
    xml.text("Constant", &double(), "1");
    xml.open("Apply", &[("function", "+".to_string())]);
    xml.text("Constant", &double(), "1");
    xml.open("Apply", &[("function", "exp".to_string())]);
    xml.open("Apply", &[("function", "*".to_string())]);
    xml.text("Constant", &double(), "-1");
    xml.empty("FieldRef", &[("field", field.to_string())]);
    xml.close("Apply");
    xml.close("Apply");
    xml.close("Apply");
    xml.close("Apply");
}

/// Opens the final `RegressionModel` of a classifier chain, up to its tables
fn chained_classifier(
    xml: &mut XmlWriter,
    config: &PmmlConfig,
    classes: &[String],
    normalization: &str,
    scores: &[String],
) {
    xml.open(
        "RegressionModel",
        &[
            ("functionName", "classification".to_string()),
            ("normalizationMethod", normalization.to_string()),
        ],
    );
    xml.open("MiningSchema", &[]);
    xml.empty(
        "MiningField",
        &[
            ("name", config.target.clone()),
            ("usageType", "target".to_string()),
        ],
    );
    for score in scores {
        xml.empty("MiningField", &[("name", score.clone())]);
    }
    xml.close("MiningSchema");
    xml.open("Output", &[]);
    for class in classes {
        xml.empty(
            "OutputField",
            &[
                ("name", format!("probability({class})")),
                ("optype", "continuous".to_string()),
                ("dataType", "double".to_string()),
                ("feature", "probability".to_string()),
                ("value", class.clone()),
            ],
        );
    }
    xml.close("Output");
}

/// A `sum` segmentation over a constant base score and `trees`
fn tree_sum<'a>(
    xml: &mut XmlWriter,
    base_score: f64,
    trees: impl Iterator<Item = &'a Tree>,
    features: &[Feature],
) -> Result<()> {
    xml.open("Segmentation", &[("multipleModelMethod", "sum".to_string())]);

    xml.open("Segment", &[("id", "1".to_string())]);
    xml.empty("True", &[]);
    tree_model_start(xml);
    xml.empty("MiningSchema", &[]);
    xml.open("Node", &[("score", num(base_score))]);
    xml.empty("True", &[]);
    xml.close("Node");
    xml.close("TreeModel");
    xml.close("Segment");

    for (i, tree) in trees.enumerate() {
        xml.open("Segment", &[("id", (i + 2).to_string())]);
        xml.empty("True", &[]);
        tree_model_start(xml);
        xml.open("MiningSchema", &[]);
        for field in tree_fields(tree, features)? {
            xml.empty("MiningField", &[("name", field)]);
        }
        xml.close("MiningSchema");
        tree_node(xml, tree.nodes(), 0, &NodeTest::True, features)?;
        xml.close("TreeModel");
        xml.close("Segment");
    }

    xml.close("Segmentation");
    Ok(())
}

fn tree_model_start(xml: &mut XmlWriter) {
    xml.open(
        "TreeModel",
        &[
            ("functionName", "regression".to_string()),
            ("missingValueStrategy", "none".to_string()),
            ("noTrueChildStrategy", "returnLastPrediction".to_string()),
            ("splitCharacteristic", "binarySplit".to_string()),
        ],
    );
}

fn split_feature(features: &[Feature], index: usize) -> Result<&Feature> {
    features
        .get(index)
        .ok_or_else(|| Error::shape(format!("feature index below {}", features.len()), index))
}

/// Fields a tree splits on, in first-use order
fn tree_fields(tree: &Tree, features: &[Feature]) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    for node in tree.nodes() {
        if let Node::Split { feature, .. } = node {
            let field = split_feature(features, *feature)?.field();
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }
    Ok(fields)
}

/// Predicate guarding one `Node` element
#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    True,
    False,
    Simple {
        field: String,
        operator: &'static str,
        value: String,
    },
    Set {
        field: String,
        operator: &'static str,
        values: Vec<String>,
    },
}

impl NodeTest {
    fn write(&self, xml: &mut XmlWriter) {
        match self {
            Self::True => xml.empty("True", &[]),
            Self::False => xml.empty("False", &[]),
            Self::Simple {
                field,
                operator,
                value,
            } => xml.empty(
                "SimplePredicate",
                &[
                    ("field", field.clone()),
                    ("operator", (*operator).to_string()),
                    ("value", value.clone()),
                ],
            ),
            Self::Set {
                field,
                operator,
                values,
            } => {
                xml.open(
                    "SimpleSetPredicate",
                    &[
                        ("field", field.clone()),
                        ("booleanOperator", (*operator).to_string()),
                    ],
                );
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
                    .collect();
                xml.text(
                    "Array",
                    &[("n", values.len().to_string()), ("type", "string".to_string())],
                    &quoted.join(" "),
                );
                xml.close("SimpleSetPredicate");
            }
        }
    }
}

/// Predicates for the left and right children of a split
///
/// Ordinal features compare category strings, so an unseen category takes
/// the right branch just as its out-of-range code does at scoring time.
fn split_tests(feature: &Feature, condition: SplitCondition) -> (NodeTest, NodeTest) {
    let simple = |operator, value: f64| NodeTest::Simple {
        field: feature.field(),
        operator,
        value: num(value),
    };
    match (feature, condition) {
        (Feature::Ordinal { column, categories }, SplitCondition::Equals(code)) => {
            match category_code(code, categories.len()) {
                Some(code) => (
                    NodeTest::Simple {
                        field: column.clone(),
                        operator: "equal",
                        value: categories[code].clone(),
                    },
                    NodeTest::Simple {
                        field: column.clone(),
                        operator: "notEqual",
                        value: categories[code].clone(),
                    },
                ),
                None => (NodeTest::False, NodeTest::True),
            }
        }
        (Feature::Ordinal { column, categories }, SplitCondition::LessOrEqual(threshold)) => {
            let values: Vec<String> = categories
                .iter()
                .enumerate()
                .filter(|(code, _)| *code as f64 <= threshold)
                .map(|(_, category)| category.clone())
                .collect();
            if values.is_empty() {
                return (NodeTest::False, NodeTest::True);
            }
            (
                NodeTest::Set {
                    field: column.clone(),
                    operator: "isIn",
                    values: values.clone(),
                },
                NodeTest::Set {
                    field: column.clone(),
                    operator: "isNotIn",
                    values,
                },
            )
        }
        (_, SplitCondition::LessOrEqual(threshold)) => {
            (simple("lessOrEqual", threshold), simple("greaterThan", threshold))
        }
        (_, SplitCondition::Equals(value)) => (simple("equal", value), simple("notEqual", value)),
    }
}

fn tree_node(
    xml: &mut XmlWriter,
    nodes: &[Node],
    id: usize,
    test: &NodeTest,
    features: &[Feature],
) -> Result<()> {
    match nodes.get(id) {
        Some(Node::Leaf { value }) => {
            xml.open("Node", &[("score", num(value))]);
            test.write(xml);
            xml.close("Node");
        }
        Some(Node::Split {
            feature,
            condition,
            left,
            right,
        }) => {
            let (go_left, go_right) = split_tests(split_feature(features, *feature)?, *condition);
            xml.open("Node", &[]);
            test.write(xml);
            tree_node(xml, nodes, *left as usize, &go_left, features)?;
            tree_node(xml, nodes, *right as usize, &go_right, features)?;
            xml.close("Node");
        }
        None => {
            return Err(Error::InvalidOperation(format!(
                "tree node {id} is out of range"
            )))
        }
    }
    Ok(())
}

fn num(value: impl Display) -> String {
    value.to_string()
}

/// Escape the five XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Indented element writer
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn declaration(&mut self) {
        self.out
            .push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    }

    fn start(&mut self, tag: &str, attrs: &[(&str, String)]) {
        self.out.push_str(&"  ".repeat(self.depth));
        self.out.push('<');
        self.out.push_str(tag);
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape_xml(value));
            self.out.push('"');
        }
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, String)]) {
        self.start(tag, attrs);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, String)]) {
        self.start(tag, attrs);
        self.out.push_str("/>\n");
    }

    fn text(&mut self, tag: &str, attrs: &[(&str, String)], text: &str) {
        self.start(tag, attrs);
        self.out.push('>');
        self.out.push_str(&escape_xml(text));
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.out.push_str(&"  ".repeat(self.depth));
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabex_core::{Column, ColumnSelector, RecordBatch};
    use tabex_models::{
        Estimator, GradientBoostingConfig, LinearRegressionConfig, NaiveBayesConfig, Pipeline,
        Targets,
    };
    use tabex_transforms::{
        CategoricalEncoderConfig, ColumnComposer, HandleUnknown, TextVectorizerConfig,
        Transformer,
    };

    fn houses() -> RecordBatch {
        RecordBatch::new(vec![
            Column::from_f64("bedrooms", vec![1.0, 2.0, 2.0, 3.0, 4.0, 4.0]),
            Column::from_strings("state", ["CA", "CA", "NY", "NY", "T&X", "T&X"]),
        ])
        .unwrap()
    }

    fn price() -> Targets {
        Targets::Numeric(vec![10.0, 19.0, 22.0, 31.0, 38.0, 41.0])
    }

    fn render(composer: ColumnComposer, estimator: Estimator, y: &Targets) -> Result<String> {
        let fitted = Pipeline::new(composer, estimator).fit(&houses(), y)?;
        to_pmml(&fitted, &PmmlConfig::default())
    }

    fn one_hot_state() -> ColumnComposer {
        ColumnComposer::new()
            .add("beds", ColumnSelector::name("bedrooms"), Transformer::Passthrough)
            .add("state", ColumnSelector::name("state"), Transformer::one_hot())
    }

    #[test]
    fn test_linear_regression_document() {
        let pmml = render(
            one_hot_state(),
            Estimator::LinearRegression(LinearRegressionConfig::default()),
            &price(),
        )
        .unwrap();

        assert!(pmml.starts_with("<?xml version=\"1.0\""));
        assert!(pmml.contains("<PMML version=\"4.4\""));
        assert!(pmml.contains("<RegressionModel functionName=\"regression\">"));
        assert!(pmml.contains("<NumericPredictor name=\"bedrooms\""));
        assert!(pmml.contains("<CategoricalPredictor name=\"state\" value=\"CA\""));
        assert!(pmml.contains("<Value value=\"T&amp;X\"/>"));
        assert!(pmml.contains("usageType=\"target\""));
        assert!(!pmml.contains("TransformationDictionary"));
    }

    #[test]
    fn test_naive_bayes_document() {
        let composer = ColumnComposer::new()
            .add("beds", ColumnSelector::name("bedrooms"), Transformer::Passthrough)
            .add(
                "state",
                ColumnSelector::name("state"),
                Transformer::CategoricalEncoder(CategoricalEncoderConfig::ordinal(
                    HandleUnknown::Ignore,
                )),
            );
        let pmml = render(
            composer,
            Estimator::NaiveBayes(NaiveBayesConfig::default()),
            &Targets::labels(["lo", "lo", "mid", "mid", "hi", "hi"]),
        )
        .unwrap();

        assert!(pmml.contains("<NaiveBayesModel functionName=\"classification\""));
        assert!(pmml.contains("<GaussianDistribution"));
        assert!(pmml.contains("<PairCounts value=\"NY\">"));
        assert!(pmml.contains("<BayesOutput fieldName=\"target\">"));
        assert!(pmml.contains("<TargetValueCount value=\"hi\" count=\"2\"/>"));
    }

    #[test]
    fn test_naive_bayes_one_hot_uses_indicators() {
        let pmml = render(
            one_hot_state(),
            Estimator::NaiveBayes(NaiveBayesConfig::default()),
            &Targets::labels(["lo", "lo", "mid", "mid", "hi", "hi"]),
        )
        .unwrap();

        assert!(pmml.contains("<DerivedField name=\"state=CA\""));
        assert!(pmml.contains("<NormDiscrete field=\"state\" value=\"CA\"/>"));
        assert!(pmml.contains("<BayesInput fieldName=\"state=NY\">"));
    }

    #[test]
    fn test_text_features_use_text_index() {
        let batch = RecordBatch::new(vec![Column::from_strings(
            "note",
            ["big house", "small house", "big yard"],
        )])
        .unwrap();
        let fitted = Pipeline::new(
            ColumnComposer::new().add("note", ColumnSelector::name("note"), Transformer::text()),
            Estimator::LinearRegression(LinearRegressionConfig::default()),
        )
        .fit(&batch, &Targets::Numeric(vec![3.0, 1.0, 2.0]))
        .unwrap();
        let pmml = to_pmml(&fitted, &PmmlConfig::default()).unwrap();

        assert!(pmml.contains("<DefineFunction name=\"noteTransform\""));
        assert!(pmml.contains("wordSeparatorCharacterRE=\"\\W+\""));
        assert!(pmml.contains("<Constant>house</Constant>"));
        assert!(pmml.contains("<NumericPredictor name=\"note(big)\""));
    }

    fn small_forest() -> Estimator {
        Estimator::GradientBoosting(GradientBoostingConfig {
            n_estimators: 3,
            ..GradientBoostingConfig::default()
        })
    }

    fn ordinal_state() -> ColumnComposer {
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
    fn test_gradient_boosting_regression_segments() {
        let pmml = render(one_hot_state(), small_forest(), &price()).unwrap();

        assert!(pmml.contains("<MiningModel functionName=\"regression\""));
        assert!(pmml.contains("<Segmentation multipleModelMethod=\"sum\">"));
        // Base score plus one segment per tree
        assert_eq!(pmml.matches("<TreeModel ").count(), 4);
        assert!(pmml.contains(&format!("<Node score=\"{}\">", 161.0 / 6.0)));
        assert!(pmml.contains("operator=\"lessOrEqual\""));
        assert!(pmml.contains("operator=\"greaterThan\""));
        assert!(pmml.contains("<DerivedField name=\"state=CA\""));
        assert!(!pmml.contains("modelChain"));
    }

    #[test]
    fn test_gradient_boosting_ordinal_splits_on_categories() {
        let pmml = render(ordinal_state(), small_forest(), &price()).unwrap();

        assert!(pmml.contains("<SimplePredicate field=\"state\" operator=\"equal\""));
        assert!(pmml.contains("<SimplePredicate field=\"state\" operator=\"notEqual\""));
        assert!(!pmml.contains("field=\"state\" operator=\"lessOrEqual\""));
    }

    #[test]
    fn test_gradient_boosting_binary_chain() {
        let pmml = render(
            one_hot_state(),
            small_forest(),
            &Targets::labels(["no", "no", "no", "yes", "yes", "yes"]),
        )
        .unwrap();

        assert!(pmml.contains("<MiningModel functionName=\"classification\""));
        assert!(pmml.contains("<Segmentation multipleModelMethod=\"modelChain\">"));
        assert!(pmml.contains("<Apply function=\"exp\">"));
        assert!(pmml.contains("normalizationMethod=\"none\""));
        assert!(pmml.contains("<RegressionTable intercept=\"0\" targetCategory=\"yes\">"));
        assert!(pmml.contains("<RegressionTable intercept=\"0\" targetCategory=\"no\"/>"));
        assert!(pmml.contains("<OutputField name=\"probability(no)\""));
        assert_eq!(pmml.matches("<TreeModel ").count(), 4);
    }

    #[test]
    fn test_gradient_boosting_multiclass_chain() {
        let pmml = render(
            ordinal_state(),
            small_forest(),
            &Targets::labels(["lo", "lo", "mid", "mid", "hi", "hi"]),
        )
        .unwrap();

        assert!(pmml.contains("normalizationMethod=\"softmax\""));
        assert!(pmml.contains("<NumericPredictor name=\"rawScore(mid)\" coefficient=\"1\"/>"));
        // Three classes, each with a base score and three trees
        assert_eq!(pmml.matches("<TreeModel ").count(), 12);
        assert_eq!(pmml.matches("<Segment id=\"4\">").count(), 1 + 3);
    }

    #[test]
    fn test_ordinal_threshold_becomes_set() {
        let feature = Feature::Ordinal {
            column: "state".to_string(),
            categories: vec!["CA".to_string(), "N\"Y".to_string(), "TX".to_string()],
        };
        let (left, right) = split_tests(&feature, SplitCondition::LessOrEqual(1.5));
        assert_eq!(
            left,
            NodeTest::Set {
                field: "state".to_string(),
                operator: "isIn",
                values: vec!["CA".to_string(), "N\"Y".to_string()],
            }
        );
        assert!(matches!(right, NodeTest::Set { operator: "isNotIn", .. }));

        let mut xml = XmlWriter::new();
        left.write(&mut xml);
        let written = xml.finish();
        assert!(written.contains(
            "<Array n=\"2\" type=\"string\">&quot;CA&quot; &quot;N\\&quot;Y&quot;</Array>"
        ));
    }

    #[test]
    fn test_unseen_code_never_goes_left() {
        let feature = Feature::Ordinal {
            column: "state".to_string(),
            categories: vec!["CA".to_string()],
        };
        assert_eq!(
            split_tests(&feature, SplitCondition::Equals(3.0)),
            (NodeTest::False, NodeTest::True)
        );
    }

    #[test]
    fn test_ordinal_into_regression_unsupported() {
        let composer = ColumnComposer::new().add(
            "state",
            ColumnSelector::name("state"),
            Transformer::CategoricalEncoder(CategoricalEncoderConfig::ordinal(
                HandleUnknown::Ignore,
            )),
        );
        assert!(matches!(
            render(
                composer,
                Estimator::LinearRegression(LinearRegressionConfig::default()),
                &price(),
            ),
            Err(Error::UnsupportedTransformer(_))
        ));
    }

    #[test]
    fn test_tf_idf_unsupported() {
        let batch = RecordBatch::new(vec![Column::from_strings("note", ["a b", "b c"])]).unwrap();
        let fitted = Pipeline::new(
            ColumnComposer::new().add(
                "note",
                ColumnSelector::name("note"),
                Transformer::TextVectorizer(
                    TextVectorizerConfig::default()
                        .with_weighting(tabex_transforms::TermWeighting::TfIdf),
                ),
            ),
            Estimator::LinearRegression(LinearRegressionConfig::default()),
        )
        .fit(&batch, &Targets::Numeric(vec![1.0, 2.0]))
        .unwrap();

        assert!(matches!(
            to_pmml(&fitted, &PmmlConfig::default()),
            Err(Error::UnsupportedTransformer(_))
        ));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"a<b>&"c"'"#), "a&lt;b&gt;&amp;&quot;c&quot;&apos;");
    }
}
