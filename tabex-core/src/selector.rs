//! Column selection by name or position

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Selects one or more columns from a record batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnSelector {
    /// Select columns by name, in the given order
    Names(Vec<String>),

    /// Select columns by position, in the given order
    Indices(Vec<usize>),
}

impl ColumnSelector {
    /// Select a single column by name
    pub fn name(name: &str) -> Self {
        ColumnSelector::Names(vec![name.to_string()])
    }

    /// Select several columns by name
    pub fn names<S: AsRef<str>>(names: &[S]) -> Self {
        ColumnSelector::Names(names.iter().map(|n| n.as_ref().to_string()).collect())
    }

    /// Select a single column by position
    pub fn index(index: usize) -> Self {
        ColumnSelector::Indices(vec![index])
    }

    /// Resolve to positional indices against a schema
    ///
    /// Fails with [`Error::UnknownColumn`] if any referenced column is absent.
    pub fn resolve(&self, schema: &Schema) -> Result<Vec<usize>> {
        match self {
            ColumnSelector::Names(names) => names.iter().map(|n| schema.index_of(n)).collect(),
            ColumnSelector::Indices(indices) => indices
                .iter()
                .map(|&i| {
                    if i < schema.len() {
                        Ok(i)
                    } else {
                        Err(Error::UnknownColumn(format!(
                            "#{i} (batch has {} columns)",
                            schema.len()
                        )))
                    }
                })
                .collect(),
        }
    }

    /// Number of columns this selector names
    pub fn len(&self) -> usize {
        match self {
            ColumnSelector::Names(names) => names.len(),
            ColumnSelector::Indices(indices) => indices.len(),
        }
    }

    /// Check if this selector names no columns
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Names(names) => write!(f, "[{}]", names.join(", ")),
            ColumnSelector::Indices(indices) => {
                let parts: Vec<String> = indices.iter().map(|i| format!("#{i}")).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field};
    use test_case::test_case;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("bedrooms", DataType::Float64),
            Field::new("bathrooms", DataType::Float64),
            Field::new("state", DataType::Utf8),
        ])
        .unwrap()
    }

    #[test_case(ColumnSelector::name("state"), &[2] ; "single name")]
    #[test_case(ColumnSelector::names(&["state", "bedrooms"]), &[2, 0] ; "names keep order")]
    #[test_case(ColumnSelector::Indices(vec![1, 1]), &[1, 1] ; "repeated index")]
    #[test_case(ColumnSelector::index(0), &[0] ; "single index")]
    #[test_case(ColumnSelector::Names(Vec::new()), &[] ; "empty")]
    fn test_resolve(selector: ColumnSelector, expected: &[usize]) {
        assert_eq!(selector.resolve(&schema()).unwrap(), expected);
    }

    #[test_case(ColumnSelector::name("price") ; "unknown name")]
    #[test_case(ColumnSelector::names(&["state", "State"]) ; "names are case sensitive")]
    #[test_case(ColumnSelector::index(3) ; "index past the end")]
    fn test_resolve_fails(selector: ColumnSelector) {
        assert!(matches!(
            selector.resolve(&schema()),
            Err(Error::UnknownColumn(_))
        ));
    }
}
