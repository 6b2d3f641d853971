//! Write and DDL statements: INSERT, UPDATE, DELETE, CREATE TABLE, DROP TABLE.

use crate::expr::{Dialect, Expr};
use paranoid_core::{Column, SqlType, Table, Value};

/// A statement that does not return rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: Table,
        if_not_exists: bool,
    },
    DropTable {
        table: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        values: Vec<(String, Value)>,
    },
    Update {
        table: String,
        set: Vec<(String, Value)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
}

impl Statement {
    /// INSERT of the given column values.
    ///
    /// NULL primary key columns are left out so the backend can generate them.
    pub fn insert<'a>(
        table: &Table,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Self {
        let values = values
            .into_iter()
            .filter(|(name, value)| {
                !(value.is_null() && table.get(name).is_some_and(|c| c.primary_key))
            })
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Statement::Insert {
            table: table.name().to_string(),
            values,
        }
    }

    /// UPDATE `set` columns on rows matching `filter`.
    pub fn update<'a>(
        table: &str,
        set: impl IntoIterator<Item = (&'a str, Value)>,
        filter: Option<Expr>,
    ) -> Self {
        Statement::Update {
            table: table.to_string(),
            set: set
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            filter,
        }
    }

    /// DELETE rows matching `filter`.
    pub fn delete(table: &str, filter: Option<Expr>) -> Self {
        Statement::Delete {
            table: table.to_string(),
            filter,
        }
    }

    /// Name of the table this statement targets.
    pub fn table_name(&self) -> &str {
        match self {
            Statement::CreateTable { table, .. } => table.name(),
            Statement::DropTable { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => table,
        }
    }

    /// Build the SQL and parameters (PostgreSQL dialect).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.to_sql(Dialect::Postgres)
    }

    /// Build the SQL and parameters for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = match self {
            Statement::CreateTable {
                table,
                if_not_exists,
            } => create_table_sql(table, *if_not_exists, dialect),

            Statement::DropTable { table, if_exists } => {
                let exists = if *if_exists { "IF EXISTS " } else { "" };
                format!("DROP TABLE {exists}{}", dialect.quote_identifier(table))
            }

            Statement::Insert { table, values } => {
                let columns: Vec<_> = values
                    .iter()
                    .map(|(name, _)| dialect.quote_identifier(name))
                    .collect();
                let placeholders: Vec<_> = values
                    .iter()
                    .map(|(_, value)| {
                        params.push(value.clone());
                        dialect.placeholder(params.len())
                    })
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    dialect.quote_identifier(table),
                    columns.join(", "),
                    placeholders.join(", ")
                )
            }

            Statement::Update { table, set, filter } => {
                let assignments: Vec<_> = set
                    .iter()
                    .map(|(name, value)| {
                        params.push(value.clone());
                        format!(
                            "{} = {}",
                            dialect.quote_identifier(name),
                            dialect.placeholder(params.len())
                        )
                    })
                    .collect();
                let mut sql = format!(
                    "UPDATE {} SET {}",
                    dialect.quote_identifier(table),
                    assignments.join(", ")
                );
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(&filter.build_with_dialect(dialect, &mut params, 0));
                }
                sql
            }

            Statement::Delete { table, filter } => {
                let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(table));
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(&filter.build_with_dialect(dialect, &mut params, 0));
                }
                sql
            }
        };
        (sql, params)
    }
}

/// Render `CREATE TABLE` for a registered table.
pub fn create_table_sql(table: &Table, if_not_exists: bool, dialect: Dialect) -> String {
    let mut sql = String::from("CREATE TABLE ");
    if if_not_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&dialect.quote_identifier(table.name()));
    sql.push_str(" (\n  ");

    let rowid = rowid_alias(table, dialect);
    let mut parts: Vec<String> = table
        .columns()
        .iter()
        .map(|c| {
            if rowid.is_some_and(|r| r.name == c.name) {
                format!("{} INTEGER PRIMARY KEY", dialect.quote_identifier(&c.name))
            } else {
                column_definition(c, dialect)
            }
        })
        .collect();

    let pk: Vec<_> = table
        .primary_key()
        .iter()
        .map(|c| dialect.quote_identifier(&c.name))
        .collect();
    if !pk.is_empty() && rowid.is_none() {
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    for column in table.columns() {
        if column.unique && !column.primary_key {
            parts.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                dialect.quote_identifier(&format!("uk_{}_{}", table.name(), column.name)),
                dialect.quote_identifier(&column.name)
            ));
        }
        if let Some((ref_table, ref_column)) = &column.foreign_key {
            parts.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
                dialect.quote_identifier(&format!("fk_{}_{}", table.name(), column.name)),
                dialect.quote_identifier(&column.name),
                dialect.quote_identifier(ref_table),
                dialect.quote_identifier(ref_column),
                column.on_delete.as_sql()
            ));
        }
    }

    sql.push_str(&parts.join(",\n  "));
    sql.push_str("\n)");
    sql
}

/// A single integer key on SQLite must be declared `INTEGER PRIMARY KEY`
/// to alias the rowid and be generated on insert.
fn rowid_alias(table: &Table, dialect: Dialect) -> Option<&Column> {
    match (dialect, table.primary_key().as_slice()) {
        (Dialect::Sqlite, [column])
            if matches!(column.sql_type, SqlType::Integer | SqlType::BigInt) =>
        {
            Some(*column)
        }
        _ => None,
    }
}

fn column_definition(column: &Column, dialect: Dialect) -> String {
    let mut def = format!(
        "{} {}",
        dialect.quote_identifier(&column.name),
        column.sql_type.sql_name()
    );
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;
    use paranoid_core::ReferentialAction;

    fn user_group() -> Table {
        Table::new("user_group")
            .with_column(
                Column::new("user_id", SqlType::BigInt)
                    .primary_key(true)
                    .references("user", "id"),
            )
            .with_column(
                Column::new("group_id", SqlType::BigInt)
                    .primary_key(true)
                    .references("group", "id")
                    .on_delete(ReferentialAction::Cascade),
            )
    }

    #[test]
    fn test_insert_skips_null_primary_key() {
        let table = Table::new("group")
            .with_column(Column::new("id", SqlType::BigInt).primary_key(true))
            .with_column(Column::new("name", SqlType::Text));
        let stmt = Statement::insert(
            &table,
            vec![("id", Value::Null), ("name", Value::Text("admins".into()))],
        );
        let (sql, params) = stmt.build();
        assert_eq!(sql, "INSERT INTO \"group\" (\"name\") VALUES ($1)");
        assert_eq!(params, vec![Value::Text("admins".into())]);
    }

    #[test]
    fn test_update_params_precede_filter() {
        let stmt = Statement::update(
            "user",
            vec![("deleted_at", Value::TimestampTz(10))],
            Some(Expr::qualified("user", "id").eq(3_i64)),
        );
        let (sql, params) = stmt.build();
        assert_eq!(
            sql,
            "UPDATE \"user\" SET \"deleted_at\" = $1 WHERE \"user\".\"id\" = $2"
        );
        assert_eq!(params, vec![Value::TimestampTz(10), Value::BigInt(3)]);
    }

    #[test]
    fn test_delete() {
        let stmt = Statement::delete("user", Some(Expr::qualified("user", "id").eq(1_i64)));
        assert_eq!(stmt.build().0, "DELETE FROM \"user\" WHERE \"user\".\"id\" = $1");
        assert_eq!(stmt.table_name(), "user");
    }

    #[test]
    fn test_create_table() {
        let sql = create_table_sql(&user_group(), true, Dialect::Postgres);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"user_group\" ("));
        assert!(sql.contains("\"user_id\" BIGINT NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (\"user_id\", \"group_id\")"));
        assert!(sql.contains(
            "FOREIGN KEY (\"group_id\") REFERENCES \"group\"(\"id\") ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_sqlite_integer_key_aliases_rowid() {
        let table = Table::new("group")
            .with_column(Column::new("id", SqlType::BigInt).primary_key(true))
            .with_column(Column::new("name", SqlType::Text));
        let sql = create_table_sql(&table, false, Dialect::Sqlite);
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY,"));
        assert!(!sql.contains("PRIMARY KEY (\"id\")"));

        let composite = create_table_sql(&user_group(), false, Dialect::Sqlite);
        assert!(composite.contains("PRIMARY KEY (\"user_id\", \"group_id\")"));
        assert!(composite.contains("\"user_id\" BIGINT NOT NULL"));
    }

    #[test]
    fn test_drop_table() {
        let stmt = Statement::DropTable {
            table: "user".into(),
            if_exists: true,
        };
        assert_eq!(stmt.build().0, "DROP TABLE IF EXISTS \"user\"");
    }
}
