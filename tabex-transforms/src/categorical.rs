//! Categorical encoding: one-hot and ordinal
//!
//! Categories are indexed in first-seen order during fit.

use std::collections::HashMap;

use tabex_core::{Column, Error, FeatureMatrix, Result};

use crate::config::{CategoricalEncoderConfig, CategoricalOutput, HandleUnknown};

/// Fitted categorical encoder
#[derive(Debug, Clone, PartialEq)]
pub struct FittedCategoricalEncoder {
    /// Source column
    column: String,

    /// Known categories, index = position
    categories: Vec<String>,

    /// Reverse lookup
    index: HashMap<String, usize>,

    /// Options the encoder was fitted with
    config: CategoricalEncoderConfig,
}

impl FittedCategoricalEncoder {
    /// Learn the distinct values of a string column
    pub fn fit(column: &Column, config: CategoricalEncoderConfig) -> Result<Self> {
        let values = column.as_utf8()?;

        let mut categories = Vec::new();
        let mut index = HashMap::new();
        for value in values {
            if !index.contains_key(value) {
                index.insert(value.clone(), categories.len());
                categories.push(value.clone());
            }
        }

        Ok(Self {
            column: column.name().to_string(),
            categories,
            index,
            config,
        })
    }

    /// Encode a column with the learned categories
    pub fn transform(&self, column: &Column) -> Result<FeatureMatrix> {
        let values = column.as_utf8()?;
        let width = self.n_features_out();
        let mut block = FeatureMatrix::zeros(values.len(), width);

        for (row, value) in values.iter().enumerate() {
            let code = self.lookup(value)?;
            match self.config.output {
                CategoricalOutput::OneHot => {
                    if let Some(code) = code {
                        block.set(row, code, 1.0);
                    }
                }
                CategoricalOutput::Ordinal => {
                    let code = code.unwrap_or(self.unknown_code());
                    block.set(row, 0, code as f64);
                }
            }
        }

        Ok(block)
    }

    fn lookup(&self, value: &str) -> Result<Option<usize>> {
        match self.index.get(value) {
            Some(&code) => Ok(Some(code)),
            None => match self.config.handle_unknown {
                HandleUnknown::Ignore => Ok(None),
                HandleUnknown::Error => Err(Error::UnknownCategory {
                    column: self.column.clone(),
                    value: value.to_string(),
                }),
            },
        }
    }

    /// Ordinal sentinel for values not seen at fit time
    pub fn unknown_code(&self) -> usize {
        self.categories.len()
    }

    /// Source column
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Categories in index order
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Options the encoder was fitted with
    pub fn config(&self) -> CategoricalEncoderConfig {
        self.config
    }

    /// Output width: category count for one-hot, 1 for ordinal
    pub fn n_features_out(&self) -> usize {
        match self.config.output {
            CategoricalOutput::OneHot => self.categories.len(),
            CategoricalOutput::Ordinal => 1,
        }
    }

    /// `column=value` per one-hot feature, the column name for ordinal
    pub fn feature_names(&self) -> Vec<String> {
        match self.config.output {
            CategoricalOutput::OneHot => self
                .categories
                .iter()
                .map(|c| format!("{}={}", self.column, c))
                .collect(),
            CategoricalOutput::Ordinal => vec![self.column.clone()],
        }
    }
}
