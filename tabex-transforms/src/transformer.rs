//! The closed set of feature transformers

use serde::{Deserialize, Serialize};
use tabex_core::{Column, ColumnKind, Error, FeatureMatrix, Result};

use crate::categorical::FittedCategoricalEncoder;
use crate::config::{CategoricalEncoderConfig, CategoricalOutput, TextVectorizerConfig};
use crate::passthrough::FittedPassthrough;
use crate::text::FittedTextVectorizer;

/// An unfitted feature transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transformer {
    /// Forward numeric columns unchanged
    Passthrough,

    /// Encode one string column as one-hot or ordinal codes
    CategoricalEncoder(CategoricalEncoderConfig),

    /// Count vocabulary tokens in one string column
    TextVectorizer(TextVectorizerConfig),
}

impl Transformer {
    /// Default one-hot encoder
    pub fn one_hot() -> Self {
        Self::CategoricalEncoder(CategoricalEncoderConfig::default())
    }

    /// Default text vectorizer
    pub fn text() -> Self {
        Self::TextVectorizer(TextVectorizerConfig::default())
    }

    /// Kind of source column this transformer consumes
    pub fn input_kind(&self) -> ColumnKind {
        match self {
            Self::Passthrough => ColumnKind::Numeric,
            Self::CategoricalEncoder(_) => ColumnKind::Categorical,
            Self::TextVectorizer(_) => ColumnKind::Text,
        }
    }

    /// Fit on the selected columns, returning a new immutable value
    pub fn fit(&self, columns: &[&Column]) -> Result<FittedTransformer> {
        match self {
            Self::Passthrough => FittedPassthrough::fit(columns).map(FittedTransformer::Passthrough),
            Self::CategoricalEncoder(config) => {
                let column = single_column(columns, "categorical encoder")?;
                FittedCategoricalEncoder::fit(column, *config).map(FittedTransformer::Categorical)
            }
            Self::TextVectorizer(config) => {
                let column = single_column(columns, "text vectorizer")?;
                FittedTextVectorizer::fit(column, config).map(FittedTransformer::Text)
            }
        }
    }
}

fn single_column<'a>(columns: &[&'a Column], what: &str) -> Result<&'a Column> {
    match columns {
        [column] => Ok(column),
        _ => Err(Error::InvalidArgument(format!(
            "{what} takes exactly one column, got {}",
            columns.len()
        ))),
    }
}

/// A fitted feature transformer
#[derive(Debug, Clone)]
pub enum FittedTransformer {
    /// Fitted passthrough
    Passthrough(FittedPassthrough),

    /// Fitted categorical encoder
    Categorical(FittedCategoricalEncoder),

    /// Fitted text vectorizer
    Text(FittedTextVectorizer),
}

impl FittedTransformer {
    /// Turn the selected columns into a feature block
    pub fn transform(&self, columns: &[&Column]) -> Result<FeatureMatrix> {
        match self {
            Self::Passthrough(p) => p.transform(columns),
            Self::Categorical(c) => c.transform(single_column(columns, "categorical encoder")?),
            Self::Text(t) => t.transform(single_column(columns, "text vectorizer")?),
        }
    }

    /// Kind of source column consumed
    pub fn input_kind(&self) -> ColumnKind {
        match self {
            Self::Passthrough(_) => ColumnKind::Numeric,
            Self::Categorical(_) => ColumnKind::Categorical,
            Self::Text(_) => ColumnKind::Text,
        }
    }

    /// Block width, fixed at fit time
    pub fn n_features_out(&self) -> usize {
        match self {
            Self::Passthrough(p) => p.n_features_out(),
            Self::Categorical(c) => c.n_features_out(),
            Self::Text(t) => t.n_features_out(),
        }
    }

    /// Per-feature names
    pub fn feature_names(&self) -> Vec<String> {
        match self {
            Self::Passthrough(p) => p.feature_names(),
            Self::Categorical(c) => c.feature_names(),
            Self::Text(t) => t.feature_names(),
        }
    }

    /// Whether the block holds category codes rather than magnitudes
    pub fn emits_codes(&self) -> bool {
        matches!(self, Self::Categorical(c) if c.config().output == CategoricalOutput::Ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column_transformers_reject_many() {
        let a = Column::from_strings("a", ["x"]);
        let b = Column::from_strings("b", ["y"]);

        for transformer in [Transformer::one_hot(), Transformer::text()] {
            assert!(matches!(
                transformer.fit(&[&a, &b]),
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_fit_dispatch() {
        let state = Column::from_strings("state", ["CA", "NY"]);
        let fitted = Transformer::one_hot().fit(&[&state]).unwrap();

        assert_eq!(fitted.input_kind(), ColumnKind::Categorical);
        assert_eq!(fitted.n_features_out(), 2);
        assert!(!fitted.emits_codes());

        let ordinal = Transformer::CategoricalEncoder(CategoricalEncoderConfig::ordinal(
            Default::default(),
        ))
        .fit(&[&state])
        .unwrap();
        assert!(ordinal.emits_codes());
    }

    #[test]
    fn test_transformer_config_serde() {
        let json = serde_json::to_string(&Transformer::one_hot()).unwrap();
        let back: Transformer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Transformer::one_hot());
    }
}
