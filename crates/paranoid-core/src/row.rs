//! Database row representation.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Separator between table and column in aliased result columns
/// (`"user"."name" AS "user__name"`).
pub const ALIAS_SEPARATOR: &str = "__";

/// Build the result alias for a table-qualified column.
pub fn column_alias(table: &str, column: &str) -> String {
    format!("{table}{ALIAS_SEPARATOR}{column}")
}

/// Column metadata shared across all rows in a result set.
///
/// This struct is wrapped in `Arc` so all rows from the same query share
/// the same column information.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a database query.
///
/// Rows provide both index-based and name-based access to column values.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Check if a column exists by name.
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.index_of(name).is_some()
    }

    /// Get a typed value by column name.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
                rust_type: None,
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Get all column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// Iterate over all values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Extract the columns aliased as `<table>__<column>` into a row keyed by
    /// the bare column name.
    ///
    /// Returns `None` when the row has no column for `table`, or when every
    /// such column is NULL (the null-extended side of an outer join).
    pub fn subset_by_prefix(&self, table: &str) -> Option<Row> {
        let prefix = format!("{table}{ALIAS_SEPARATOR}");
        let mut names = Vec::new();
        let mut values = Vec::new();
        for (name, value) in self.iter() {
            if let Some(column) = name.strip_prefix(&prefix) {
                names.push(column.to_string());
                values.push(value.clone());
            }
        }
        if names.is_empty() || values.iter().all(Value::is_null) {
            return None;
        }
        Some(Row::new(names, values))
    }
}

/// Trait for converting from a `Value` to a typed value.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

impl<T> FromValue for T
where
    T: TryFrom<Value, Error = Error>,
{
    fn from_value(value: &Value) -> Result<Self> {
        T::try_from(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_named_reports_column() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::BigInt(1), Value::Text("jeanphix".into())],
        );
        assert_eq!(row.get_named::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_named::<String>("name").unwrap(), "jeanphix");

        let err = row.get_named::<i64>("name").unwrap_err();
        match err {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("name")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(row.get_named::<i64>("missing").is_err());
    }

    #[test]
    fn nullable_column_reads_as_option() {
        let row = Row::new(vec!["deleted_at".into()], vec![Value::Null]);
        assert_eq!(row.get_named::<Option<i64>>("deleted_at").unwrap(), None);
    }

    #[test]
    fn subset_by_prefix_strips_alias() {
        let row = Row::new(
            vec![
                column_alias("user", "id"),
                column_alias("user", "name"),
                column_alias("group", "id"),
            ],
            vec![Value::BigInt(1), Value::Text("a".into()), Value::BigInt(9)],
        );
        let user = row.subset_by_prefix("user").unwrap();
        assert_eq!(user.len(), 2);
        assert_eq!(user.get_named::<i64>("id").unwrap(), 1);

        let group = row.subset_by_prefix("group").unwrap();
        assert_eq!(group.get_named::<i64>("id").unwrap(), 9);

        assert!(row.subset_by_prefix("user_group").is_none());
    }

    #[test]
    fn subset_by_prefix_all_null_is_absent() {
        let row = Row::new(
            vec![column_alias("group", "id"), column_alias("group", "name")],
            vec![Value::Null, Value::Null],
        );
        assert!(row.subset_by_prefix("group").is_none());
    }
}
