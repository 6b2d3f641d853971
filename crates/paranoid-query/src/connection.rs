//! Database connection trait.
//!
//! Connections execute structured statements rather than SQL text. A driver
//! renders them with `Select::to_sql` / `Statement::to_sql` for its dialect;
//! in-process backends evaluate them directly.

use crate::expr::Dialect;
use crate::select::Select;
use crate::statement::Statement;
use asupersync::{Cx, Outcome};
use paranoid_core::{Error, Row};
use std::future::Future;

/// A database connection.
///
/// All operations are async and take a `Cx` so they participate in
/// cancellation and budgets.
///
/// # Result rows
///
/// Rows returned by `query` name their columns `<table>__<column>` as
/// projected by the `Select`; a COUNT statement returns one row with a
/// single `count` column.
pub trait Connection: Send + Sync {
    /// SQL dialect used to render statements for this connection.
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    /// Execute a SELECT and return all rows.
    fn query(
        &self,
        cx: &Cx,
        select: &Select,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a statement and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Execute an INSERT and return the generated integer key, if any.
    fn insert(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send;

    /// Begin a transaction.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Commit the open transaction.
    fn commit(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Roll back the open transaction.
    fn rollback(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}
