//! Two-dimensional tensors and named engine inputs/outputs

use std::collections::BTreeMap;

use tabex_core::{DataType, Error, Result};

/// A row-major `n_rows x n_cols` tensor
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    /// Numeric values
    Float64 {
        /// Rows
        n_rows: usize,
        /// Columns
        n_cols: usize,
        /// Row-major values
        data: Vec<f64>,
    },

    /// UTF-8 strings
    Utf8 {
        /// Rows
        n_rows: usize,
        /// Columns
        n_cols: usize,
        /// Row-major values
        data: Vec<String>,
    },
}

impl Tensor {
    /// Numeric tensor; `data.len()` must equal `n_rows * n_cols`
    pub fn float64(n_rows: usize, n_cols: usize, data: Vec<f64>) -> Result<Self> {
        check_data_len(data.len(), n_rows, n_cols)?;
        Ok(Self::Float64 {
            n_rows,
            n_cols,
            data,
        })
    }

    /// String tensor; `data.len()` must equal `n_rows * n_cols`
    pub fn utf8(n_rows: usize, n_cols: usize, data: Vec<String>) -> Result<Self> {
        check_data_len(data.len(), n_rows, n_cols)?;
        Ok(Self::Utf8 {
            n_rows,
            n_cols,
            data,
        })
    }

    /// Single numeric column
    pub fn float64_column(values: Vec<f64>) -> Self {
        Self::Float64 {
            n_rows: values.len(),
            n_cols: 1,
            data: values,
        }
    }

    /// Single string column
    pub fn utf8_column<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        let data: Vec<String> = values.into_iter().map(Into::into).collect();
        Self::Utf8 {
            n_rows: data.len(),
            n_cols: 1,
            data,
        }
    }

    /// Element type
    pub fn element_type(&self) -> DataType {
        match self {
            Self::Float64 { .. } => DataType::Float64,
            Self::Utf8 { .. } => DataType::Utf8,
        }
    }

    /// Row count
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Float64 { n_rows, .. } | Self::Utf8 { n_rows, .. } => *n_rows,
        }
    }

    /// Column count
    pub fn n_cols(&self) -> usize {
        match self {
            Self::Float64 { n_cols, .. } | Self::Utf8 { n_cols, .. } => *n_cols,
        }
    }

    /// Numeric values, or `TypeMismatch`
    pub fn as_f64(&self) -> Result<&[f64]> {
        match self {
            Self::Float64 { data, .. } => Ok(data),
            Self::Utf8 { .. } => Err(Error::TypeMismatch("expected a Float64 tensor".into())),
        }
    }

    /// String values, or `TypeMismatch`
    pub fn as_utf8(&self) -> Result<&[String]> {
        match self {
            Self::Utf8 { data, .. } => Ok(data),
            Self::Float64 { .. } => Err(Error::TypeMismatch("expected a Utf8 tensor".into())),
        }
    }

    /// Fails with `ShapeMismatch` unless `data.len() == n_rows * n_cols`
    pub fn check_len(&self) -> Result<()> {
        let len = match self {
            Self::Float64 { data, .. } => data.len(),
            Self::Utf8 { data, .. } => data.len(),
        };
        check_data_len(len, self.n_rows(), self.n_cols())
    }

    /// Row `i` of a numeric tensor
    pub fn f64_row(&self, i: usize) -> Result<&[f64]> {
        let n_cols = self.n_cols();
        self.as_f64()?
            .get(i * n_cols..(i + 1) * n_cols)
            .ok_or_else(|| Error::shape(format!("row {i}"), format!("{} rows", self.n_rows())))
    }

    /// Gather columns by position, keeping the element type
    pub fn select_columns(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&j| j >= self.n_cols()) {
            return Err(Error::shape(
                format!("column index below {}", self.n_cols()),
                format!("column index {bad}"),
            ));
        }

        let (n_rows, n_cols) = (self.n_rows(), self.n_cols());
        let gather = |i: usize| indices.iter().map(move |&j| i * n_cols + j);
        Ok(match self {
            Self::Float64 { data, .. } => Self::Float64 {
                n_rows,
                n_cols: indices.len(),
                data: (0..n_rows).flat_map(gather).map(|k| data[k]).collect(),
            },
            Self::Utf8 { data, .. } => Self::Utf8 {
                n_rows,
                n_cols: indices.len(),
                data: (0..n_rows).flat_map(gather).map(|k| data[k].clone()).collect(),
            },
        })
    }
}

fn check_data_len(len: usize, n_rows: usize, n_cols: usize) -> Result<()> {
    if len == n_rows * n_cols {
        Ok(())
    } else {
        Err(Error::shape(
            format!("{} values for {n_rows}x{n_cols}", n_rows * n_cols),
            format!("{len} values"),
        ))
    }
}

/// Named input tensors, one per artifact input slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineInputs {
    tensors: BTreeMap<String, Tensor>,
}

impl EngineInputs {
    /// No inputs
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named tensor
    pub fn with(mut self, name: &str, tensor: Tensor) -> Self {
        self.insert(name, tensor);
        self
    }

    /// Add or replace a named tensor
    pub fn insert(&mut self, name: &str, tensor: Tensor) {
        self.tensors.insert(name.to_string(), tensor);
    }

    /// Look up a tensor
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Input names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }
}

/// Named output tensors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutputs {
    tensors: BTreeMap<String, Tensor>,
}

impl EngineOutputs {
    pub(crate) fn insert(&mut self, name: &str, tensor: Tensor) {
        self.tensors.insert(name.to_string(), tensor);
    }

    /// Look up an output
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| Error::UnknownColumn(format!("output '{name}'")))
    }

    /// Regression predictions
    pub fn prediction(&self) -> Result<Vec<f64>> {
        Ok(self.get(crate::artifact::names::PREDICTION)?.as_f64()?.to_vec())
    }

    /// Predicted class labels
    pub fn labels(&self) -> Result<Vec<String>> {
        Ok(self.get(crate::artifact::names::LABEL)?.as_utf8()?.to_vec())
    }

    /// Class probabilities, one row per input row
    pub fn probabilities(&self) -> Result<Vec<Vec<f64>>> {
        let tensor = self.get(crate::artifact::names::PROBABILITIES)?;
        let n_cols = tensor.n_cols();
        if n_cols == 0 {
            return Ok(vec![Vec::new(); tensor.n_rows()]);
        }
        Ok(tensor.as_f64()?.chunks(n_cols).map(<[f64]>::to_vec).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_columns() {
        let t = Tensor::float64(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let picked = t.select_columns(&[2, 0]).unwrap();
        assert_eq!(picked, Tensor::float64(2, 2, vec![3.0, 1.0, 6.0, 4.0]).unwrap());
        assert!(t.select_columns(&[3]).is_err());
    }

    #[test]
    fn test_length_checked() {
        assert!(matches!(
            Tensor::float64(2, 2, vec![1.0]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_hand_built_tensor_checked() {
        let short = Tensor::Float64 {
            n_rows: 2,
            n_cols: 1,
            data: vec![1.0],
        };
        assert!(matches!(short.check_len(), Err(Error::ShapeMismatch { .. })));
        assert!(short.f64_row(0).is_ok());
        assert!(matches!(short.f64_row(1), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_type_accessors() {
        let t = Tensor::utf8_column(["a", "b"]);
        assert_eq!(t.element_type(), DataType::Utf8);
        assert!(matches!(t.as_f64(), Err(Error::TypeMismatch(_))));
    }
}
