//! Runtime table metadata.
//!
//! `Table` is the dynamic counterpart of a model's static `FieldInfo` slice.
//! It also describes raw tables that have no model at all (association tables,
//! reporting tables), so queries and the mapper can treat both uniformly.

use crate::error::{Error, SchemaError, SchemaErrorKind};
use crate::field::ReferentialAction;
use crate::identifiers::is_valid_identifier;
use crate::model::Model;
use crate::types::SqlType;
use crate::Result;

/// Name of the soft-delete timestamp column.
pub const DELETED_AT: &str = "deleted_at";

/// A column of a registered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Owning table name (filled in when the column is added to a table).
    pub table: String,
    /// Column name
    pub name: String,
    /// SQL type
    pub sql_type: SqlType,
    /// Whether NULL is allowed
    pub nullable: bool,
    /// Part of the primary key
    pub primary_key: bool,
    /// UNIQUE constraint
    pub unique: bool,
    /// Referenced `(table, column)`
    pub foreign_key: Option<(String, String)>,
    /// ON DELETE action for the foreign key
    pub on_delete: ReferentialAction,
}

impl Column {
    /// Create a NOT NULL column.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            table: String::new(),
            name: name.into(),
            sql_type,
            nullable: false,
            primary_key: false,
            unique: false,
            foreign_key: None,
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// The soft-delete timestamp column: nullable, timezone-aware.
    pub fn deleted_at() -> Self {
        Self::new(DELETED_AT, SqlType::TimestampTz).nullable(true)
    }

    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Add a foreign key to `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some((table.into(), column.into()));
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Whether this is the soft-delete timestamp column.
    pub fn is_deleted_at(&self) -> bool {
        self.name == DELETED_AT
    }
}

/// A registered table: a name plus ordered columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    /// Stored table when `name` is an alias.
    source: Option<String>,
    columns: Vec<Column>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            columns: Vec::new(),
        }
    }

    /// This table under another name, as used to join a table to itself.
    ///
    /// Columns are qualified by `alias`; `source_name` keeps naming the stored
    /// table.
    #[must_use]
    pub fn aliased(&self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        let columns = self
            .columns
            .iter()
            .cloned()
            .map(|mut column| {
                column.table.clone_from(&alias);
                column
            })
            .collect();
        Self {
            source: Some(self.source_name().to_string()),
            name: alias,
            columns,
        }
    }

    /// Name of the stored table; differs from `name` for an alias.
    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    pub fn is_alias(&self) -> bool {
        self.source.is_some()
    }

    /// Append a column; the column's `table` is set to this table.
    #[must_use]
    pub fn with_column(mut self, mut column: Column) -> Self {
        column.table.clone_from(&self.name);
        self.columns.push(column);
        self
    }

    /// Build the table for a model.
    ///
    /// The `deleted_at` column is present if and only if `M::SOFT_DELETE`.
    pub fn of<M: Model>() -> Self {
        let mut table = Table::new(M::TABLE_NAME);
        for field in M::fields() {
            let mut column = Column::new(field.column_name, field.sql_type.clone())
                .nullable(field.nullable)
                .primary_key(field.primary_key || M::PRIMARY_KEY.contains(&field.column_name))
                .unique(field.unique);
            if let Some((ref_table, ref_column)) = field.foreign_key_target() {
                column = column.references(ref_table, ref_column);
            }
            if let Some(action) = field.on_delete {
                column = column.on_delete(action);
            }
            table = table.with_column(column);
        }
        if M::SOFT_DELETE && table.get(DELETED_AT).is_none() {
            table = table.with_column(Column::deleted_at());
        }
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The soft-delete timestamp column, if this table declares one.
    pub fn deleted_at(&self) -> Option<&Column> {
        self.get(DELETED_AT)
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Tables this table references through foreign keys (self references excluded).
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref().map(|(t, _)| t.as_str()))
            .filter(|t| *t != self.name)
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Check names and column uniqueness.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if !is_valid_identifier(&self.name) {
            return Err(invalid(format!("invalid table name '{}'", self.name)));
        }
        if self.columns.is_empty() {
            return Err(invalid(format!("table '{}' has no columns", self.name)));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if !is_valid_identifier(&column.name) {
                return Err(invalid(format!(
                    "invalid column name '{}' on table '{}'",
                    column.name, self.name
                )));
            }
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(invalid(format!(
                    "duplicate column '{}' on table '{}'",
                    column.name, self.name
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::Schema(SchemaError {
        kind: SchemaErrorKind::Invalid,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldInfo;
    use crate::row::Row;
    use crate::value::Value;

    struct Plain;

    impl Model for Plain {
        const TABLE_NAME: &'static str = "plain";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
                FieldInfo::new("owner_id", "owner_id", SqlType::BigInt)
                    .nullable(true)
                    .foreign_key("owner.id")
                    .on_delete(ReferentialAction::SetNull),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![]
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Self)
        }

        fn primary_key_value(&self) -> Vec<Value> {
            vec![]
        }

        fn is_new(&self) -> bool {
            true
        }
    }

    struct Paranoid;

    impl Model for Paranoid {
        const TABLE_NAME: &'static str = "paranoid";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];
        const SOFT_DELETE: bool = true;

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] =
                &[FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true)];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![]
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Self)
        }

        fn primary_key_value(&self) -> Vec<Value> {
            vec![]
        }

        fn is_new(&self) -> bool {
            true
        }
    }

    #[test]
    fn deleted_at_only_when_soft_delete() {
        assert!(Table::of::<Plain>().deleted_at().is_none());

        let table = Table::of::<Paranoid>();
        let column = table.deleted_at().unwrap();
        assert!(column.nullable);
        assert_eq!(column.table, "paranoid");
        assert_eq!(column.sql_type, SqlType::TimestampTz);
    }

    #[test]
    fn foreign_keys_carry_over() {
        let table = Table::of::<Plain>();
        let owner = table.get("owner_id").unwrap();
        assert_eq!(owner.foreign_key, Some(("owner".into(), "id".into())));
        assert_eq!(owner.on_delete, ReferentialAction::SetNull);
        assert_eq!(table.dependencies(), vec!["owner"]);
        assert_eq!(table.primary_key().len(), 1);
    }

    #[test]
    fn raw_table_builder() {
        let table = Table::new("user_group")
            .with_column(Column::new("user_id", SqlType::BigInt).references("user", "id"))
            .with_column(Column::new("group_id", SqlType::BigInt).references("group", "id"));
        assert!(table.validate().is_ok());
        assert!(table.deleted_at().is_none());
        assert_eq!(table.dependencies(), vec!["group", "user"]);
        assert_eq!(table.get("user_id").unwrap().table, "user_group");
    }

    #[test]
    fn aliased_table_requalifies_columns() {
        let table = Table::of::<Paranoid>();
        assert!(!table.is_alias());

        let alias = table.aliased("paranoid_parent");
        assert!(alias.is_alias());
        assert_eq!(alias.name(), "paranoid_parent");
        assert_eq!(alias.source_name(), "paranoid");
        assert_eq!(alias.deleted_at().unwrap().table, "paranoid_parent");
        assert_eq!(alias.aliased("again").source_name(), "paranoid");
    }

    #[test]
    fn validate_rejects_bad_names() {
        let table = Table::new("bad name").with_column(Column::new("id", SqlType::BigInt));
        assert!(table.validate().is_err());

        let dup = Table::new("t")
            .with_column(Column::new("id", SqlType::BigInt))
            .with_column(Column::new("id", SqlType::Text));
        assert!(dup.validate().is_err());

        assert!(Table::new("empty").validate().is_err());
    }
}
