//! Configuration values for feature transformers
//!
//! Every option is an explicit value passed to `fit`; nothing is read from
//! process-wide state.

use serde::{Deserialize, Serialize};

/// What to do with a category value that was not seen at fit time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Emit an all-zero one-hot row, or the ordinal sentinel
    #[default]
    Ignore,

    /// Fail with `UnknownCategory`
    Error,
}

/// Output layout of a categorical encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalOutput {
    /// One column per category holding 0 or 1
    #[default]
    OneHot,

    /// A single column holding the category index
    ///
    /// Estimators that branch natively on categories consume these codes as
    /// labels rather than magnitudes.
    Ordinal,
}

/// Options for a categorical encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoricalEncoderConfig {
    /// Output layout
    pub output: CategoricalOutput,

    /// Unknown-category policy
    pub handle_unknown: HandleUnknown,
}

impl CategoricalEncoderConfig {
    /// One-hot output with the given unknown policy
    pub fn one_hot(handle_unknown: HandleUnknown) -> Self {
        Self {
            output: CategoricalOutput::OneHot,
            handle_unknown,
        }
    }

    /// Ordinal output with the given unknown policy
    pub fn ordinal(handle_unknown: HandleUnknown) -> Self {
        Self {
            output: CategoricalOutput::Ordinal,
            handle_unknown,
        }
    }
}

/// Per-token weighting applied by the text vectorizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermWeighting {
    /// Raw token counts
    #[default]
    TermFrequency,

    /// Counts scaled by a smoothed inverse document frequency
    TfIdf,
}

/// Options for a text vectorizer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TextVectorizerConfig {
    /// Regular expression matching token separators
    pub token_pattern: String,

    /// Keep letter case when tokenizing
    pub case_sensitive: bool,

    /// Tokens removed before counting
    pub stop_words: Vec<String>,

    /// Drop tokens shorter than this many characters from the vocabulary
    pub min_length: Option<usize>,

    /// Drop tokens appearing in fewer documents than this
    pub min_occurrences: Option<usize>,

    /// Drop tokens appearing in more documents than this
    pub max_occurrences: Option<usize>,

    /// Keep only the most frequent tokens
    pub max_features: Option<usize>,

    /// Term weighting
    pub weighting: TermWeighting,
}

impl Default for TextVectorizerConfig {
    fn default() -> Self {
        Self {
            token_pattern: r"\W+".to_string(),
            case_sensitive: false,
            stop_words: Vec::new(),
            min_length: None,
            min_occurrences: None,
            max_occurrences: None,
            max_features: None,
            weighting: TermWeighting::TermFrequency,
        }
    }
}

impl TextVectorizerConfig {
    /// Cap the vocabulary to the `k` most frequent tokens
    pub fn with_max_features(mut self, k: usize) -> Self {
        self.max_features = Some(k);
        self
    }

    /// Use a custom separator pattern
    pub fn with_token_pattern(mut self, pattern: &str) -> Self {
        self.token_pattern = pattern.to_string();
        self
    }

    /// Set the term weighting
    pub fn with_weighting(mut self, weighting: TermWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Keep letter case
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}
