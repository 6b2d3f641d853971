//! Schema creation for paranoid.
//!
//! This crate provides:
//! - CREATE TABLE generation from `Model` types and raw tables, with the
//!   `deleted_at` column present exactly for soft-delete models
//! - Foreign key ordering for creating and dropping whole schemas
//! - `create_all` / `drop_all` executed through a `Connection`

pub mod create;

pub use create::{CreateTable, SchemaBuilder, dependency_order};

use asupersync::{Cx, Outcome};
use paranoid_core::{Error, Model, Table, quote_ident};
use paranoid_query::{Connection, Statement};

/// Create a table for a model type.
///
/// # Example
///
/// ```ignore
/// let sql = create_table::<User>().if_not_exists().build();
/// ```
pub fn create_table<M: Model>() -> CreateTable<M> {
    CreateTable::new()
}

async fn run_all<C: Connection>(cx: &Cx, conn: &C, statements: &[Statement]) -> Outcome<(), Error> {
    for statement in statements {
        tracing::debug!(sql = %statement.to_sql(conn.dialect()).0, "schema");
        match conn.execute(cx, statement).await {
            Outcome::Ok(_) => continue,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }
    Outcome::Ok(())
}

/// Create all tables, referenced tables first.
///
/// Tables that already exist are left alone.
#[tracing::instrument(level = "debug", skip_all, fields(tables = tables.len()))]
pub async fn create_all<C: Connection>(cx: &Cx, conn: &C, tables: &[Table]) -> Outcome<(), Error> {
    let statements = match SchemaBuilder::new().tables(tables).if_not_exists().statements() {
        Ok(statements) => statements,
        Err(e) => return Outcome::Err(e),
    };
    run_all(cx, conn, &statements).await
}

/// Drop all tables, referencing tables first.
#[tracing::instrument(level = "debug", skip_all, fields(tables = tables.len()))]
pub async fn drop_all<C: Connection>(cx: &Cx, conn: &C, tables: &[Table]) -> Outcome<(), Error> {
    let ordered = match dependency_order(tables) {
        Ok(ordered) => ordered,
        Err(e) => return Outcome::Err(e),
    };
    let statements: Vec<Statement> = ordered
        .iter()
        .rev()
        .map(|table| Statement::DropTable {
            table: table.name().to_string(),
            if_exists: true,
        })
        .collect();
    run_all(cx, conn, &statements).await
}

/// Drop a table.
pub async fn drop_table<C: Connection>(
    cx: &Cx,
    conn: &C,
    table_name: &str,
    if_exists: bool,
) -> Outcome<(), Error> {
    let statement = Statement::DropTable {
        table: table_name.to_string(),
        if_exists,
    };
    conn.execute(cx, &statement).await.map(|_| ())
}

/// Generate DROP TABLE SQL (for testing/inspection).
pub fn drop_table_sql(table_name: &str, if_exists: bool) -> String {
    if if_exists {
        format!("DROP TABLE IF EXISTS {}", quote_ident(table_name))
    } else {
        format!("DROP TABLE {}", quote_ident(table_name))
    }
}
