//! Record batch implementation for columnar tabular data

use std::fmt;
use std::sync::Arc;

use crate::column::{Column, ColumnData};
use crate::error::{Error, Result};
use crate::schema::{Field, Schema};
use crate::selector::ColumnSelector;

/// A collection of equally long columns representing a batch of records
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Schema describing the data
    schema: Arc<Schema>,

    /// Columns in this batch
    columns: Vec<Column>,

    /// Number of rows in this batch
    row_count: usize,
}

impl RecordBatch {
    /// Create a new record batch from columns, deriving the schema
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let fields = columns
            .iter()
            .map(|c| Field::new(c.name(), c.data_type()))
            .collect();
        let schema = Schema::new(fields)?;

        Self::with_schema(Arc::new(schema), columns)
    }

    /// Create a new record batch with the given schema and columns
    pub fn with_schema(schema: Arc<Schema>, columns: Vec<Column>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(Error::shape(
                format!("{} columns", schema.len()),
                format!("{} columns", columns.len()),
            ));
        }

        // Verify columns match schema
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.name() != field.name() {
                return Err(Error::InvalidArgument(format!(
                    "Column name mismatch: expected '{}', got '{}'",
                    field.name(),
                    column.name()
                )));
            }

            if column.data_type() != field.data_type() {
                return Err(Error::TypeMismatch(format!(
                    "column '{}': expected {}, got {}",
                    field.name(),
                    field.data_type(),
                    column.data_type()
                )));
            }
        }

        // Verify all columns have the same length
        let row_count = columns.first().map_or(0, Column::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(Error::shape(
                format!("{row_count} rows"),
                format!("{} rows in column '{}'", bad.len(), bad.name()),
            ));
        }

        Ok(Self {
            schema,
            columns,
            row_count,
        })
    }

    /// Get the schema of this batch
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the number of rows in this batch
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Get the number of columns in this batch
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if this batch has no rows
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Get a reference to a column by index
    pub fn column(&self, index: usize) -> Result<&Column> {
        self.columns
            .get(index)
            .ok_or_else(|| Error::UnknownColumn(format!("#{index}")))
    }

    /// Get a reference to a column by name
    pub fn column_by_name(&self, name: &str) -> Result<&Column> {
        let index = self.schema.index_of(name)?;
        self.column(index)
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Borrow the columns a selector refers to, in selector order
    pub fn select(&self, selector: &ColumnSelector) -> Result<Vec<&Column>> {
        selector
            .resolve(&self.schema)?
            .into_iter()
            .map(|i| self.column(i))
            .collect()
    }

    /// Gather rows by index, in the given order
    pub fn take(&self, rows: &[usize]) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.take(rows))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: self.schema.clone(),
            columns,
            row_count: rows.len(),
        })
    }

    /// Slice this batch to a contiguous range of rows
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(offset, length))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: self.schema.clone(),
            columns,
            row_count: length,
        })
    }

    /// Create a projection of this batch with only the specified column names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|&name| self.schema.index_of(name))
            .collect::<Result<Vec<_>>>()?;

        let schema = Arc::new(self.schema.project(&indices)?);
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();

        Ok(Self {
            schema,
            columns,
            row_count: self.row_count,
        })
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RecordBatch: {} rows, {} columns",
            self.row_count,
            self.columns.len()
        )?;

        for column in &self.columns {
            let preview = match column.data() {
                ColumnData::Float64(values) => values
                    .iter()
                    .take(5)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
                ColumnData::Utf8(values) => values
                    .iter()
                    .take(5)
                    .map(|v| format!("{v:?}"))
                    .collect::<Vec<_>>(),
            };
            writeln!(f, "  {} ({}): [{}]", column.name(), column.data_type(), preview.join(", "))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn houses() -> RecordBatch {
        RecordBatch::new(vec![
            Column::from_f64("bedrooms", vec![1.0, 2.0, 3.0]),
            Column::from_strings("state", ["CA", "CA", "NY"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_derives_schema() {
        let batch = houses();
        assert_eq!(batch.row_count(), 3);
        assert_eq!(batch.column_count(), 2);
        assert_eq!(batch.schema().index_of("state").unwrap(), 1);
    }

    #[test]
    fn test_unequal_lengths_rejected() {
        let result = RecordBatch::new(vec![
            Column::from_f64("a", vec![1.0, 2.0]),
            Column::from_f64("b", vec![1.0]),
        ]);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_select_and_unknown_column() {
        let batch = houses();
        let selected = batch.select(&ColumnSelector::name("state")).unwrap();
        assert_eq!(selected[0].name(), "state");

        assert!(matches!(
            batch.column_by_name("price"),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_take_and_project() {
        let batch = houses();
        let reordered = batch.take(&[2, 1, 0]).unwrap();
        assert_eq!(
            reordered.column_by_name("bedrooms").unwrap().as_f64().unwrap(),
            &[3.0, 2.0, 1.0]
        );

        let projected = batch.project_by_names(&["state"]).unwrap();
        assert_eq!(projected.column_count(), 1);
        assert_eq!(projected.row_count(), 3);
    }

    proptest! {
        #[test]
        fn prop_take_gathers_every_column(
            values in prop::collection::vec(-1e6f64..1e6, 1..32),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..48),
        ) {
            let labels: Vec<String> = (0..values.len()).map(|i| format!("row{i}")).collect();
            let batch = RecordBatch::new(vec![
                Column::from_f64("x", values.clone()),
                Column::from_strings("label", labels.clone()),
            ])
            .unwrap();
            let rows: Vec<usize> = picks.iter().map(|p| p.index(values.len())).collect();

            let taken = batch.take(&rows).unwrap();
            prop_assert_eq!(taken.row_count(), rows.len());
            for (out, &row) in rows.iter().enumerate() {
                prop_assert_eq!(taken.column(0).unwrap().as_f64().unwrap()[out], values[row]);
                prop_assert_eq!(&taken.column(1).unwrap().as_utf8().unwrap()[out], &labels[row]);
            }
        }

        #[test]
        fn prop_slice_matches_take(
            len in 1usize..32,
            start in any::<prop::sample::Index>(),
            span in any::<prop::sample::Index>(),
        ) {
            let offset = start.index(len + 1);
            let length = span.index(len - offset + 1);
            let values: Vec<f64> = (0..len).map(|i| i as f64).collect();
            let batch = RecordBatch::new(vec![Column::from_f64("x", values)]).unwrap();
            let rows: Vec<usize> = (offset..offset + length).collect();

            prop_assert_eq!(batch.slice(offset, length).unwrap(), batch.take(&rows).unwrap());
        }
    }
}
