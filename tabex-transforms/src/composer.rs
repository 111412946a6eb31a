//! Column composer: routes column subsets through transformers
//!
//! Each step selects a subset of source columns and feeds it to one
//! transformer. Fitting runs the steps independently in declared order;
//! transforming concatenates their blocks left-to-right in the same order.
//! After fit, steps refer to their source columns by name, so a batch whose
//! columns are reordered still transforms the same way.

use std::collections::HashSet;

use tabex_core::{
    Column, ColumnKind, ColumnSelector, Error, FeatureMatrix, FeatureTransform, RecordBatch,
    Result,
};
use tracing::debug;

use crate::transformer::{FittedTransformer, Transformer};

/// One unfitted composer step
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerStep {
    /// Step name, unique within a composer
    pub name: String,

    /// Source columns
    pub selector: ColumnSelector,

    /// Transformer applied to the selected columns
    pub transformer: Transformer,
}

/// An ordered list of (name, selector, transformer) steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnComposer {
    steps: Vec<ComposerStep>,
}

impl ColumnComposer {
    /// Empty composer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn add(mut self, name: &str, selector: ColumnSelector, transformer: Transformer) -> Self {
        self.steps.push(ComposerStep {
            name: name.to_string(),
            selector,
            transformer,
        });
        self
    }

    /// Declared steps
    pub fn steps(&self) -> &[ComposerStep] {
        &self.steps
    }

    /// Fit every step on its selected columns
    pub fn fit(&self, batch: &RecordBatch) -> Result<FittedComposer> {
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(Error::SchemaConflict(format!(
                    "duplicate composer step '{}'",
                    step.name
                )));
            }

            let columns = batch.select(&step.selector)?;
            let transformer = step.transformer.fit(&columns)?;
            debug!(
                step = %step.name,
                columns = columns.len(),
                width = transformer.n_features_out(),
                "fitted composer step"
            );

            steps.push(FittedStep {
                name: step.name.clone(),
                columns: columns.iter().map(|c| c.name().to_string()).collect(),
                transformer,
            });
        }

        Ok(FittedComposer { steps })
    }
}

/// A fitted step: source column names plus the fitted transformer
#[derive(Debug, Clone)]
pub struct FittedStep {
    name: String,
    columns: Vec<String>,
    transformer: FittedTransformer,
}

impl FittedStep {
    /// Step name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source column names, in selector order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fitted transformer
    pub fn transformer(&self) -> &FittedTransformer {
        &self.transformer
    }

    fn select<'a>(&self, batch: &'a RecordBatch) -> Result<Vec<&'a Column>> {
        self.columns
            .iter()
            .map(|name| batch.column_by_name(name))
            .collect()
    }
}

/// Placement of one step's block in the composed feature vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    /// Step name
    pub name: String,
    /// First feature index of the block
    pub offset: usize,
    /// Block width
    pub width: usize,
}

/// A fitted column composer
#[derive(Debug, Clone)]
pub struct FittedComposer {
    steps: Vec<FittedStep>,
}

impl FittedComposer {
    /// Fitted steps in declared order
    pub fn steps(&self) -> &[FittedStep] {
        &self.steps
    }

    /// Offset and width of each step's block
    pub fn block_layout(&self) -> Vec<BlockLayout> {
        let mut offset = 0;
        self.steps
            .iter()
            .map(|step| {
                let width = step.transformer.n_features_out();
                let layout = BlockLayout {
                    name: step.name.clone(),
                    offset,
                    width,
                };
                offset += width;
                layout
            })
            .collect()
    }

    /// Feature indices holding category codes
    pub fn categorical_feature_indices(&self) -> Vec<usize> {
        self.block_layout()
            .into_iter()
            .zip(&self.steps)
            .filter(|(_, step)| step.transformer.emits_codes())
            .flat_map(|(layout, _)| layout.offset..layout.offset + layout.width)
            .collect()
    }

    /// Every referenced source column with its kind, in first-reference order
    pub fn input_columns(&self) -> Vec<(String, ColumnKind)> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for step in &self.steps {
            let kind = step.transformer.input_kind();
            for name in &step.columns {
                if seen.insert((name.as_str(), kind)) {
                    columns.push((name.clone(), kind));
                }
            }
        }
        columns
    }
}

impl FeatureTransform for FittedComposer {
    fn transform(&self, batch: &RecordBatch) -> Result<FeatureMatrix> {
        let blocks = self
            .steps
            .iter()
            .map(|step| step.transformer.transform(&step.select(batch)?))
            .collect::<Result<Vec<_>>>()?;

        FeatureMatrix::hstack(&blocks, batch.row_count())
    }

    fn n_features_out(&self) -> usize {
        self.steps
            .iter()
            .map(|s| s.transformer.n_features_out())
            .sum()
    }

    fn feature_names(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|s| s.transformer.feature_names())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategoricalEncoderConfig, HandleUnknown, TextVectorizerConfig};
    use proptest::prelude::*;

    fn houses() -> RecordBatch {
        RecordBatch::new(vec![
            Column::from_f64("bedrooms", vec![2.0, 3.0, 4.0]),
            Column::from_f64("bathrooms", vec![1.0, 2.0, 2.0]),
            Column::from_strings("state", ["CA", "CA", "NY"]),
        ])
        .unwrap()
    }

    fn composer() -> ColumnComposer {
        ColumnComposer::new()
            .add(
                "numeric",
                ColumnSelector::names(&["bedrooms", "bathrooms"]),
                Transformer::Passthrough,
            )
            .add("state", ColumnSelector::name("state"), Transformer::one_hot())
    }

    #[test]
    fn test_blocks_concatenate_in_declared_order() {
        let fitted = composer().fit(&houses()).unwrap();
        let matrix = fitted.transform(&houses()).unwrap();

        assert_eq!(matrix.shape(), (3, 4));
        assert_eq!(matrix.row(2), &[4.0, 2.0, 0.0, 1.0]);
        assert_eq!(
            fitted.feature_names(),
            vec!["bedrooms", "bathrooms", "state=CA", "state=NY"]
        );
        assert_eq!(
            fitted.block_layout(),
            vec![
                BlockLayout { name: "numeric".into(), offset: 0, width: 2 },
                BlockLayout { name: "state".into(), offset: 2, width: 2 },
            ]
        );
    }

    #[test]
    fn test_duplicate_step_names() {
        let composer = ColumnComposer::new()
            .add("x", ColumnSelector::name("bedrooms"), Transformer::Passthrough)
            .add("x", ColumnSelector::name("bathrooms"), Transformer::Passthrough);

        assert!(matches!(
            composer.fit(&houses()),
            Err(Error::SchemaConflict(_))
        ));
    }

    #[test]
    fn test_missing_column_at_transform() {
        let fitted = composer().fit(&houses()).unwrap();
        let batch = houses().project_by_names(&["bedrooms", "state"]).unwrap();

        assert!(matches!(
            fitted.transform(&batch),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_reordered_columns_transform_identically() {
        let fitted = composer().fit(&houses()).unwrap();
        let reordered = houses()
            .project_by_names(&["state", "bathrooms", "bedrooms"])
            .unwrap();

        assert_eq!(
            fitted.transform(&reordered).unwrap(),
            fitted.transform(&houses()).unwrap()
        );
    }

    #[test]
    fn test_ordinal_steps_report_code_indices() {
        let composer = ColumnComposer::new()
            .add("beds", ColumnSelector::name("bedrooms"), Transformer::Passthrough)
            .add(
                "state",
                ColumnSelector::name("state"),
                Transformer::CategoricalEncoder(CategoricalEncoderConfig::ordinal(
                    HandleUnknown::Ignore,
                )),
            );
        let fitted = composer.fit(&houses()).unwrap();

        assert_eq!(fitted.categorical_feature_indices(), vec![1]);
        assert_eq!(
            fitted.input_columns(),
            vec![
                ("bedrooms".to_string(), ColumnKind::Numeric),
                ("state".to_string(), ColumnKind::Categorical),
            ]
        );
    }

    #[test]
    fn test_text_step() {
        let batch = RecordBatch::new(vec![Column::from_strings("body", ["a b c", "a a b"])])
            .unwrap();
        let composer = ColumnComposer::new().add(
            "body",
            ColumnSelector::name("body"),
            Transformer::TextVectorizer(TextVectorizerConfig::default().with_max_features(2)),
        );
        let fitted = composer.fit(&batch).unwrap();

        let query = RecordBatch::new(vec![Column::from_strings("body", ["a c"])]).unwrap();
        assert_eq!(fitted.transform(&query).unwrap().row(0), &[1.0, 0.0]);
        assert_eq!(fitted.feature_names(), vec!["body(a)", "body(b)"]);
    }

    proptest! {
        #[test]
        fn prop_width_is_fixed_at_fit(
            train in prop::collection::vec("[a-d]", 1..20),
            query in prop::collection::vec("[a-f]", 0..20),
        ) {
            let fit_batch = RecordBatch::new(vec![Column::from_strings("c", train)]).unwrap();
            let composer = ColumnComposer::new()
                .add("c", ColumnSelector::name("c"), Transformer::one_hot());
            let fitted = composer.fit(&fit_batch).unwrap();

            let n = query.len();
            let query_batch = RecordBatch::new(vec![Column::from_strings("c", query)]).unwrap();
            let matrix = fitted.transform(&query_batch).unwrap();

            prop_assert_eq!(matrix.shape(), (n, fitted.n_features_out()));
        }
    }
}
