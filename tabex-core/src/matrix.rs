//! Dense row-major feature matrix

use std::fmt;

use crate::error::{Error, Result};

/// A dense two-dimensional block of `f64` features, stored row-major
///
/// Feature blocks produced by transformers and the concatenated matrix fed to
/// estimators share this type.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Number of rows (samples)
    n_rows: usize,

    /// Number of columns (features)
    n_cols: usize,

    /// Row-major values, `n_rows * n_cols` long
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Create a matrix from row-major data
    pub fn new(data: Vec<f64>, n_rows: usize, n_cols: usize) -> Result<Self> {
        if data.len() != n_rows * n_cols {
            return Err(Error::shape(
                format!("{} values for {n_rows}x{n_cols}", n_rows * n_cols),
                format!("{} values", data.len()),
            ));
        }

        Ok(Self {
            n_rows,
            n_cols,
            data,
        })
    }

    /// Create a zero-filled matrix
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    /// Create a matrix from a list of equally long rows
    ///
    /// An empty list yields a `0 x 0` matrix.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * n_cols);

        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(Error::shape(
                    format!("{n_cols} features"),
                    format!("{} features in row {i}", row.len()),
                ));
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            n_rows: rows.len(),
            n_cols,
            data,
        })
    }

    /// Create a single-column matrix
    pub fn from_column(values: &[f64]) -> Self {
        Self {
            n_rows: values.len(),
            n_cols: 1,
            data: values.to_vec(),
        }
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Row-major values
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Borrow one row
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    /// Iterate over rows
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    /// Read one value
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }

    /// Write one value
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.n_cols + col] = value;
    }

    /// Copy one column out
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.n_rows).map(|i| self.get(i, col)).collect()
    }

    /// Concatenate blocks left-to-right
    ///
    /// All blocks must have the same number of rows. `n_rows` is used when
    /// `blocks` is empty so that a zero-width result still carries the batch size.
    pub fn hstack(blocks: &[FeatureMatrix], n_rows: usize) -> Result<Self> {
        if let Some(bad) = blocks.iter().find(|b| b.n_rows != n_rows) {
            return Err(Error::shape(
                format!("{n_rows} rows"),
                format!("block with {} rows", bad.n_rows),
            ));
        }

        let n_cols: usize = blocks.iter().map(|b| b.n_cols).sum();
        let mut data = Vec::with_capacity(n_rows * n_cols);

        for i in 0..n_rows {
            for block in blocks {
                data.extend_from_slice(block.row(i));
            }
        }

        Ok(Self {
            n_rows,
            n_cols,
            data,
        })
    }
}

impl fmt::Display for FeatureMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FeatureMatrix {}x{}", self.n_rows, self.n_cols)?;
        for row in self.rows().take(10) {
            writeln!(f, "  {row:?}")?;
        }
        Ok(())
    }
}
