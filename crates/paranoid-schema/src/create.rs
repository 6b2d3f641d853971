//! CREATE TABLE generation and dependency ordering.

use paranoid_core::{Error, Model, Result, SchemaError, SchemaErrorKind, Table};
use paranoid_query::{Dialect, Statement, create_table_sql};
use std::marker::PhantomData;

/// Builder for CREATE TABLE of one model.
///
/// The `deleted_at` column is emitted when the model soft deletes.
#[derive(Debug)]
pub struct CreateTable<M: Model> {
    if_not_exists: bool,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> CreateTable<M> {
    /// Create a new CREATE TABLE builder.
    pub fn new() -> Self {
        Self {
            if_not_exists: false,
            _marker: PhantomData,
        }
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn statement(&self) -> Statement {
        Statement::CreateTable {
            table: Table::of::<M>(),
            if_not_exists: self.if_not_exists,
        }
    }

    /// Build the CREATE TABLE SQL (PostgreSQL dialect).
    pub fn build(&self) -> String {
        self.build_with_dialect(Dialect::Postgres)
    }

    pub fn build_with_dialect(&self, dialect: Dialect) -> String {
        create_table_sql(&Table::of::<M>(), self.if_not_exists, dialect)
    }
}

impl<M: Model> Default for CreateTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Order `tables` so every table comes after the tables it references.
///
/// Input order is kept among independent tables. References to tables outside
/// the set and self references are ignored.
#[allow(clippy::result_large_err)]
pub fn dependency_order(tables: &[Table]) -> Result<Vec<Table>> {
    let mut remaining: Vec<&Table> = tables.iter().collect();
    let mut ordered: Vec<Table> = Vec::with_capacity(tables.len());
    while !remaining.is_empty() {
        let ready = remaining.iter().position(|table| {
            table.dependencies().iter().all(|dep| {
                ordered.iter().any(|t| t.name() == *dep)
                    || !remaining.iter().any(|t| t.name() == *dep)
            })
        });
        match ready {
            Some(index) => ordered.push(remaining.remove(index).clone()),
            None => {
                let names: Vec<&str> = remaining.iter().map(|t| t.name()).collect();
                return Err(Error::Schema(SchemaError {
                    kind: SchemaErrorKind::Invalid,
                    message: format!("foreign key cycle between tables: {}", names.join(", ")),
                }));
            }
        }
    }
    Ok(ordered)
}

/// Builder for a whole schema.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<Table>,
    if_not_exists: bool,
}

impl SchemaBuilder {
    /// Create a new schema builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the table of model `M`.
    pub fn create_table<M: Model>(self) -> Self {
        self.table(Table::of::<M>())
    }

    /// Add a raw table, e.g. an association table.
    pub fn table(mut self, table: Table) -> Self {
        if !self.tables.iter().any(|t| t.name() == table.name()) {
            self.tables.push(table);
        }
        self
    }

    /// Add tables.
    pub fn tables<'a>(self, tables: impl IntoIterator<Item = &'a Table>) -> Self {
        tables.into_iter().cloned().fold(self, Self::table)
    }

    /// Emit IF NOT EXISTS on every CREATE TABLE.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// CREATE TABLE statements in foreign key order.
    #[allow(clippy::result_large_err)]
    pub fn statements(&self) -> Result<Vec<Statement>> {
        Ok(dependency_order(&self.tables)?
            .into_iter()
            .map(|table| Statement::CreateTable {
                table,
                if_not_exists: self.if_not_exists,
            })
            .collect())
    }

    /// Get all SQL statements.
    #[allow(clippy::result_large_err)]
    pub fn build(&self, dialect: Dialect) -> Result<Vec<String>> {
        Ok(self
            .statements()?
            .iter()
            .map(|statement| statement.to_sql(dialect).0)
            .collect())
    }
}
