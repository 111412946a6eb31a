//! Passthrough of numeric columns

use tabex_core::{Column, Error, FeatureMatrix, Result};

/// Fitted passthrough: remembers which numeric columns it forwards
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPassthrough {
    columns: Vec<String>,
}

impl FittedPassthrough {
    /// Fit on one or more numeric columns
    pub fn fit(columns: &[&Column]) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::InvalidArgument(
                "passthrough needs at least one column".into(),
            ));
        }

        for column in columns {
            column.as_f64()?;
        }

        Ok(Self {
            columns: columns.iter().map(|c| c.name().to_string()).collect(),
        })
    }

    /// Copy the numeric values, one feature per input column
    pub fn transform(&self, columns: &[&Column]) -> Result<FeatureMatrix> {
        if columns.len() != self.columns.len() {
            return Err(Error::shape(
                format!("{} passthrough columns", self.columns.len()),
                format!("{} columns", columns.len()),
            ));
        }

        let values = columns
            .iter()
            .map(|c| c.as_f64())
            .collect::<Result<Vec<_>>>()?;
        let n_rows = values.first().map_or(0, |v| v.len());
        let n_cols = values.len();
        if let Some((short, v)) = columns.iter().zip(&values).find(|(_, v)| v.len() != n_rows) {
            return Err(Error::shape(
                format!("{n_rows} rows in every passthrough column"),
                format!("{} rows in '{}'", v.len(), short.name()),
            ));
        }

        let mut data = Vec::with_capacity(n_rows * n_cols);
        for i in 0..n_rows {
            data.extend(values.iter().map(|v| v[i]));
        }

        FeatureMatrix::new(data, n_rows, n_cols)
    }

    /// Source column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Output width
    pub fn n_features_out(&self) -> usize {
        self.columns.len()
    }

    /// One feature per source column, named after it
    pub fn feature_names(&self) -> Vec<String> {
        self.columns.clone()
    }
}
