//! Bag-of-words text vectorization
//!
//! Documents are split on a separator pattern, optionally lowercased, and
//! counted against a vocabulary learned at fit time. The vocabulary keeps the
//! top-K tokens by document frequency and is ordered by first appearance in
//! the training corpus, so re-fitting the same corpus yields the same layout.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tabex_core::{Column, FeatureMatrix, Result};
use tracing::warn;

use crate::config::{TermWeighting, TextVectorizerConfig};

/// Splits documents into tokens
#[derive(Debug, Clone)]
pub struct Tokenizer {
    separator: Regex,
    case_sensitive: bool,
    stop_words: HashSet<String>,
}

impl Tokenizer {
    /// Build a tokenizer from vectorizer options
    pub fn new(config: &TextVectorizerConfig) -> Result<Self> {
        Ok(Self {
            separator: Regex::new(&config.token_pattern)?,
            case_sensitive: config.case_sensitive,
            stop_words: config.stop_words.iter().cloned().collect(),
        })
    }

    /// Tokenize one document; empty tokens and stop words are dropped
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        };

        self.separator
            .split(&text)
            .filter(|t| !t.is_empty() && !self.stop_words.contains(*t))
            .map(str::to_string)
            .collect()
    }
}

/// Fitted text vectorizer
#[derive(Debug, Clone)]
pub struct FittedTextVectorizer {
    /// Source column
    column: String,

    /// Options the vectorizer was fitted with
    config: TextVectorizerConfig,

    /// Tokenizer built from `config`
    tokenizer: Tokenizer,

    /// Vocabulary, index = feature position
    vocabulary: Vec<String>,

    /// Reverse lookup
    index: HashMap<String, usize>,

    /// Inverse document frequency per vocabulary entry, for TF-IDF
    idf: Option<Vec<f64>>,
}

impl FittedTextVectorizer {
    /// Learn a vocabulary from a column of documents
    pub fn fit(column: &Column, config: &TextVectorizerConfig) -> Result<Self> {
        let tokenizer = Tokenizer::new(config)?;
        let documents = column.as_utf8()?;

        // Document frequency, plus first-seen order
        let mut first_seen: Vec<String> = Vec::new();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for document in documents {
            let mut in_document = HashSet::new();
            for token in tokenizer.tokenize(document) {
                if !document_frequency.contains_key(&token) {
                    first_seen.push(token.clone());
                }
                if in_document.insert(token.clone()) {
                    *document_frequency.entry(token).or_insert(0) += 1;
                }
            }
        }

        let mut candidates: Vec<(usize, &String)> = first_seen
            .iter()
            .enumerate()
            .filter(|(_, token)| {
                let df = document_frequency[*token];
                config.min_length.map_or(true, |n| token.chars().count() >= n)
                    && config.min_occurrences.map_or(true, |n| df >= n)
                    && config.max_occurrences.map_or(true, |n| df <= n)
            })
            .collect();

        if let Some(k) = config.max_features {
            // Stable sort keeps first-seen order among equal frequencies
            candidates.sort_by(|a, b| document_frequency[b.1].cmp(&document_frequency[a.1]));
            candidates.truncate(k);
            candidates.sort_by_key(|(position, _)| *position);
        }

        let vocabulary: Vec<String> = candidates.into_iter().map(|(_, t)| t.clone()).collect();
        if vocabulary.is_empty() {
            warn!(column = column.name(), "text vectorizer fitted an empty vocabulary");
        }

        let index = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        let idf = match config.weighting {
            TermWeighting::TermFrequency => None,
            TermWeighting::TfIdf => {
                let n_documents = documents.len() as f64;
                Some(
                    vocabulary
                        .iter()
                        .map(|t| {
                            let df = document_frequency[t] as f64;
                            ((1.0 + n_documents) / (1.0 + df)).ln() + 1.0
                        })
                        .collect(),
                )
            }
        };

        Ok(Self {
            column: column.name().to_string(),
            config: config.clone(),
            tokenizer,
            vocabulary,
            index,
            idf,
        })
    }

    /// Count in-vocabulary tokens per document
    pub fn transform(&self, column: &Column) -> Result<FeatureMatrix> {
        let documents = column.as_utf8()?;
        let width = self.vocabulary.len();
        let mut block = FeatureMatrix::zeros(documents.len(), width);

        for (row, document) in documents.iter().enumerate() {
            for token in self.tokenizer.tokenize(document) {
                if let Some(&j) = self.index.get(&token) {
                    block.set(row, j, block.get(row, j) + 1.0);
                }
            }

            if let Some(idf) = &self.idf {
                for (j, weight) in idf.iter().enumerate() {
                    block.set(row, j, block.get(row, j) * weight);
                }
            }
        }

        Ok(block)
    }

    /// Source column
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Options the vectorizer was fitted with
    pub fn config(&self) -> &TextVectorizerConfig {
        &self.config
    }

    /// Vocabulary in feature order
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// IDF weights, present only for TF-IDF
    pub fn idf(&self) -> Option<&[f64]> {
        self.idf.as_deref()
    }

    /// Output width
    pub fn n_features_out(&self) -> usize {
        self.vocabulary.len()
    }

    /// `column(token)` per vocabulary entry
    pub fn feature_names(&self) -> Vec<String> {
        self.vocabulary
            .iter()
            .map(|t| format!("{}({})", self.column, t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn docs(values: &[&str]) -> Column {
        Column::from_strings("message", values.iter().copied())
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let config = TextVectorizerConfig::default().with_max_features(2);
        let fitted = FittedTextVectorizer::fit(&docs(&["a b c", "a a b"]), &config).unwrap();

        assert_eq!(fitted.vocabulary(), &["a".to_string(), "b".to_string()]);
        let block = fitted.transform(&docs(&["a c"])).unwrap();
        assert_eq!(block.row(0), &[1.0, 0.0]);
    }

    #[test]
    fn test_vocabulary_in_first_seen_order() {
        let config = TextVectorizerConfig::default().with_max_features(2);
        // "z" and "y" appear in every document; "z" appears first
        let fitted =
            FittedTextVectorizer::fit(&docs(&["x z y", "z y", "y z w"]), &config).unwrap();
        assert_eq!(fitted.vocabulary(), &["z".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_counts_repeated_tokens() {
        let fitted =
            FittedTextVectorizer::fit(&docs(&["Sunday is the best"]), &Default::default())
                .unwrap();
        let block = fitted.transform(&docs(&["the best, the BEST!!"])).unwrap();

        assert_eq!(fitted.n_features_out(), 4);
        assert_eq!(block.row(0), &[0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_empty_corpus_yields_empty_block() {
        let fitted = FittedTextVectorizer::fit(&docs(&[]), &Default::default()).unwrap();
        assert_eq!(fitted.n_features_out(), 0);

        let block = fitted.transform(&docs(&["anything at all"])).unwrap();
        assert_eq!(block.shape(), (1, 0));
    }

    #[test]
    fn test_tf_idf_weights() {
        let config = TextVectorizerConfig::default().with_weighting(TermWeighting::TfIdf);
        let fitted = FittedTextVectorizer::fit(&docs(&["a b", "a"]), &config).unwrap();

        let idf = fitted.idf().unwrap();
        // a: df = 2, b: df = 1, n = 2
        assert!((idf[0] - 1.0).abs() < 1e-12);
        assert!((idf[1] - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);

        let block = fitted.transform(&docs(&["b b"])).unwrap();
        assert!((block.get(0, 1) - 2.0 * idf[1]).abs() < 1e-12);
    }

    #[test_case(false, &["sunday", "is"] ; "lowercased")]
    #[test_case(true, &["Sunday", "is"] ; "case sensitive")]
    fn test_tokenizer_case(case_sensitive: bool, expected: &[&str]) {
        let config = TextVectorizerConfig::default().case_sensitive(case_sensitive);
        let tokenizer = Tokenizer::new(&config).unwrap();
        assert_eq!(tokenizer.tokenize("Sunday is"), expected);
    }

    #[test]
    fn test_occurrence_and_length_filters() {
        let config = TextVectorizerConfig {
            min_length: Some(2),
            max_occurrences: Some(1),
            ..Default::default()
        };
        let fitted =
            FittedTextVectorizer::fit(&docs(&["a bb cc", "bb dd"]), &config).unwrap();
        assert_eq!(fitted.vocabulary(), &["cc".to_string(), "dd".to_string()]);
    }

    #[test]
    fn test_bad_pattern() {
        let config = TextVectorizerConfig::default().with_token_pattern("(");
        assert!(matches!(
            FittedTextVectorizer::fit(&docs(&["a"]), &config),
            Err(tabex_core::Error::Regex(_))
        ));
    }
}
