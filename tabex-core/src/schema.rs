//! Schema definition for tabular inputs

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Physical type of column values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit floating point
    Float64,

    /// UTF-8 encoded string
    Utf8,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float64 => write!(f, "Float64"),
            DataType::Utf8 => write!(f, "Utf8"),
        }
    }
}

/// Declared role of a column within a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Continuous numeric values
    Numeric,

    /// Discrete string labels
    Categorical,

    /// Free text documents
    Text,
}

impl ColumnKind {
    /// The physical type a column of this kind must carry
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Numeric => DataType::Float64,
            ColumnKind::Categorical | ColumnKind::Text => DataType::Utf8,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
            ColumnKind::Text => write!(f, "text"),
        }
    }
}

/// A named, typed field in a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub(crate) name: String,

    /// Data type of the field
    pub(crate) data_type: DataType,
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this field
    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)
    }
}

/// Schema describing the columns of a record batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Fields in this schema
    fields: Vec<Field>,

    /// Field indices by name for faster lookup
    field_indices: HashMap<String, usize>,
}

impl Schema {
    /// Create a new schema with the given fields
    ///
    /// Duplicate names are rejected with [`Error::SchemaConflict`].
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut field_indices = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field_indices.insert(field.name.clone(), i).is_some() {
                return Err(Error::SchemaConflict(format!(
                    "duplicate column name '{}'",
                    field.name
                )));
            }
        }

        Ok(Self {
            fields,
            field_indices,
        })
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field by index
    pub fn field(&self, index: usize) -> Result<&Field> {
        self.fields
            .get(index)
            .ok_or_else(|| Error::UnknownColumn(format!("#{index}")))
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.field_indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Create a projection of this schema with only the specified fields
    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        let fields = indices
            .iter()
            .map(|&i| self.field(i).cloned())
            .collect::<Result<Vec<_>>>()?;

        Self::new(fields)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of() {
        let schema = Schema::new(vec![
            Field::new("bedrooms", DataType::Float64),
            Field::new("state", DataType::Utf8),
        ])
        .unwrap();

        assert_eq!(schema.index_of("state").unwrap(), 1);
        assert!(matches!(
            schema.index_of("price"),
            Err(Error::UnknownColumn(name)) if name == "price"
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Schema::new(vec![
            Field::new("x", DataType::Float64),
            Field::new("x", DataType::Utf8),
        ]);
        assert!(matches!(result, Err(Error::SchemaConflict(_))));
    }

    #[test]
    fn test_kind_data_type() {
        assert_eq!(ColumnKind::Numeric.data_type(), DataType::Float64);
        assert_eq!(ColumnKind::Categorical.data_type(), DataType::Utf8);
        assert_eq!(ColumnKind::Text.data_type(), DataType::Utf8);
    }
}
