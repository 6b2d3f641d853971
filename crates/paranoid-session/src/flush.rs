//! Statements emitted at flush.
//!
//! Flush runs in a fixed order: inserts, link-row inserts, updates, link-row
//! deletes, deletes. Parents are therefore written before the association
//! rows that reference them and removed only after those rows are gone.

use crate::identity_map::{ObjectKey, TrackedObject};
use paranoid_core::{Table, Value};
use paranoid_query::{Expr, Statement};

/// WHERE clause matching the primary key of `tracked`.
pub(crate) fn pk_filter(tracked: &TrackedObject) -> Option<Expr> {
    let table = tracked.table.name();
    Expr::all(
        tracked
            .pk_columns
            .iter()
            .zip(tracked.pk_values())
            .map(|(column, value)| Expr::qualified(table, *column).eq(value)),
    )
}

pub(crate) fn insert_statement(tracked: &TrackedObject) -> Statement {
    Statement::insert(
        &tracked.table,
        tracked.values.iter().map(|(name, value)| (*name, value.clone())),
    )
}

/// UPDATE of every non-key column.
pub(crate) fn update_statement(tracked: &TrackedObject) -> Statement {
    Statement::update(
        tracked.table.name(),
        tracked
            .values
            .iter()
            .filter(|(name, _)| !tracked.pk_columns.contains(name))
            .map(|(name, value)| (*name, value.clone())),
        pk_filter(tracked),
    )
}

pub(crate) fn delete_statement(tracked: &TrackedObject) -> Statement {
    Statement::delete(tracked.table.name(), pk_filter(tracked))
}

/// Whether a link operation adds or removes an association row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Insert,
    Delete,
}

/// One side of an association row.
///
/// Values are read from the tracked object at flush time, so ids generated
/// by earlier inserts in the same flush are picked up.
#[derive(Debug, Clone)]
pub(crate) struct LinkEnd {
    pub key: Option<ObjectKey>,
    /// Values of the object when the link was queued.
    pub values: Vec<(&'static str, Value)>,
    /// Column of the object that the link table references
    pub source: String,
    /// Column of the link table
    pub link_column: String,
}

/// A pending association row change.
#[derive(Debug, Clone)]
pub(crate) struct LinkOp {
    pub action: LinkAction,
    pub table: Table,
    pub ends: [LinkEnd; 2],
}

impl LinkOp {
    /// Build the statement given the resolved value of each end.
    pub fn statement(&self, values: [Value; 2]) -> Statement {
        let columns = self.ends.iter().map(|end| end.link_column.as_str());
        match self.action {
            LinkAction::Insert => Statement::insert(&self.table, columns.zip(values)),
            LinkAction::Delete => {
                let table = self.table.name();
                let filter = Expr::all(
                    columns
                        .zip(values)
                        .map(|(column, value)| Expr::qualified(table, column).eq(value)),
                );
                Statement::delete(table, filter)
            }
        }
    }
}
