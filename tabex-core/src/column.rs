//! Column implementation for storing typed vectors of data

use crate::error::{Error, Result};
use crate::schema::DataType;

/// Values held by a column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Numeric values
    Float64(Vec<f64>),

    /// String values (categories or free text)
    Utf8(Vec<String>),
}

impl ColumnData {
    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float64(values) => values.len(),
            ColumnData::Utf8(values) => values.len(),
        }
    }

    /// Check if there are no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical type of the values
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Utf8(_) => DataType::Utf8,
        }
    }
}

/// A named column of data with a specific type
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Name of the column
    name: String,

    /// The column values
    data: ColumnData,
}

impl Column {
    /// Create a new column with the given name and values
    pub fn new(name: &str, data: ColumnData) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }

    /// Create a numeric column
    pub fn from_f64(name: &str, values: Vec<f64>) -> Self {
        Self::new(name, ColumnData::Float64(values))
    }

    /// Create a string column from anything string-like
    pub fn from_strings<S: Into<String>>(name: &str, values: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            name,
            ColumnData::Utf8(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Get the name of this column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this column
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Get the length of this column (number of values)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if this column is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the raw values
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Borrow the values as numbers
    pub fn as_f64(&self) -> Result<&[f64]> {
        match &self.data {
            ColumnData::Float64(values) => Ok(values),
            ColumnData::Utf8(_) => Err(Error::TypeMismatch(format!(
                "column '{}' holds strings, expected numeric values",
                self.name
            ))),
        }
    }

    /// Borrow the values as strings
    pub fn as_utf8(&self) -> Result<&[String]> {
        match &self.data {
            ColumnData::Utf8(values) => Ok(values),
            ColumnData::Float64(_) => Err(Error::TypeMismatch(format!(
                "column '{}' holds numbers, expected string values",
                self.name
            ))),
        }
    }

    /// Gather the values at the given row indices, in that order
    pub fn take(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.len()) {
            return Err(Error::InvalidArgument(format!(
                "row {bad} out of bounds for column '{}' of length {}",
                self.name,
                self.len()
            )));
        }

        let data = match &self.data {
            ColumnData::Float64(values) => {
                ColumnData::Float64(rows.iter().map(|&r| values[r]).collect())
            }
            ColumnData::Utf8(values) => {
                ColumnData::Utf8(rows.iter().map(|&r| values[r].clone()).collect())
            }
        };

        Ok(Self {
            name: self.name.clone(),
            data,
        })
    }

    /// Slice this column to a contiguous range of values
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset + length > self.len() {
            return Err(Error::InvalidArgument(format!(
                "slice {}..{} out of bounds for column '{}' of length {}",
                offset,
                offset + length,
                self.name,
                self.len()
            )));
        }

        let rows: Vec<usize> = (offset..offset + length).collect();
        self.take(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let numbers = Column::from_f64("x", vec![1.0, 2.0]);
        let labels = Column::from_strings("state", ["CA", "NY"]);

        assert_eq!(numbers.as_f64().unwrap(), &[1.0, 2.0]);
        assert!(matches!(numbers.as_utf8(), Err(Error::TypeMismatch(_))));
        assert_eq!(labels.as_utf8().unwrap()[1], "NY");
        assert!(matches!(labels.as_f64(), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_take_reorders() {
        let column = Column::from_strings("state", ["CA", "NY", "TX"]);
        let taken = column.take(&[2, 0]).unwrap();
        assert_eq!(taken.as_utf8().unwrap(), &["TX".to_string(), "CA".to_string()]);
        assert!(column.take(&[3]).is_err());
    }

    #[test]
    fn test_slice() {
        let column = Column::from_f64("x", vec![1.0, 2.0, 3.0, 4.0]);
        let sliced = column.slice(1, 2).unwrap();
        assert_eq!(sliced.as_f64().unwrap(), &[2.0, 3.0]);
        assert!(column.slice(3, 2).is_err());
    }
}
