//! Feature transformers and the column composer
//!
//! Transformers come in three kinds: numeric passthrough, categorical
//! encoding (one-hot or ordinal), and bag-of-words text vectorization. Each
//! is fitted on its selected columns and yields a fixed-width feature block.
//! The [`ColumnComposer`] routes column subsets through transformers and
//! concatenates the blocks into one feature matrix.

#![warn(missing_docs)]

pub mod categorical;
pub mod composer;
pub mod config;
pub mod passthrough;
pub mod text;
pub mod transformer;

pub use categorical::FittedCategoricalEncoder;
pub use composer::{BlockLayout, ColumnComposer, ComposerStep, FittedComposer, FittedStep};
pub use config::{
    CategoricalEncoderConfig, CategoricalOutput, HandleUnknown, TermWeighting,
    TextVectorizerConfig,
};
pub use passthrough::FittedPassthrough;
pub use text::{FittedTextVectorizer, Tokenizer};
pub use transformer::{FittedTransformer, Transformer};
