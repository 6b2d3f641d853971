//! Soft-delete predicate injection.
//!
//! Everything that hides deleted rows goes through `restricted_condition`:
//! query roots at construction time and relationship join conditions when the
//! mappers are configured.

use crate::expr::Expr;
use paranoid_core::{Column, Model, Table};

/// `<table>.deleted_at IS NULL`
pub fn not_deleted(column: &Column) -> Expr {
    Expr::column(column).is_null()
}

/// AND `existing` with `deleted_at IS NULL`, or return it unchanged when the
/// table has no `deleted_at` column.
///
/// Feeding the result back in with another column appends one more
/// predicate, so primary and secondary rewrites compose in any order.
pub fn restricted_condition(existing: Expr, deleted_at: Option<&Column>) -> Expr {
    match deleted_at {
        Some(column) => existing.and(not_deleted(column)),
        None => existing,
    }
}

/// Soft-delete column of a raw table, found by name.
pub fn deleted_at_column(table: &Table) -> Option<&Column> {
    table.deleted_at()
}

/// A query root: an entity or a raw table.
#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    /// Entity root. Whether it soft deletes is fixed by the model declaration.
    Entity { table: Table, soft_delete: bool },
    /// Raw table root. The column is looked up by name.
    Table(Table),
}

impl Root {
    /// Root for model `M`.
    pub fn entity<M: Model>() -> Self {
        Root::Entity {
            table: Table::of::<M>(),
            soft_delete: M::SOFT_DELETE,
        }
    }

    pub fn table(&self) -> &Table {
        match self {
            Root::Entity { table, .. } | Root::Table(table) => table,
        }
    }

    /// The column whose NULL-ness marks live rows of this root.
    pub fn deleted_at_column(&self) -> Option<&Column> {
        match self {
            Root::Entity { table, soft_delete } => {
                if *soft_delete {
                    table.deleted_at()
                } else {
                    None
                }
            }
            Root::Table(table) => deleted_at_column(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paranoid_core::{SqlType, Value};

    fn table(soft: bool) -> Table {
        let t = Table::new("user").with_column(Column::new("id", SqlType::BigInt).primary_key(true));
        if soft { t.with_column(Column::deleted_at()) } else { t }
    }

    fn sql(expr: &Expr) -> String {
        let mut params: Vec<Value> = Vec::new();
        expr.build(&mut params, 0)
    }

    #[test]
    fn test_restricted_condition_without_column_is_identity() {
        let cond = Expr::qualified("user", "id").eq(Expr::qualified("post", "user_id"));
        assert_eq!(restricted_condition(cond.clone(), None), cond);
    }

    #[test]
    fn test_restricted_condition_appends_is_null() {
        let t = table(true);
        let cond = Expr::qualified("user", "id").eq(Expr::qualified("post", "user_id"));
        let restricted = restricted_condition(cond, deleted_at_column(&t));
        assert_eq!(
            sql(&restricted),
            "\"user\".\"id\" = \"post\".\"user_id\" AND \"user\".\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_restricted_condition_chains() {
        let a = Table::new("a").with_column(Column::deleted_at());
        let b = Table::new("b").with_column(Column::deleted_at());
        let cond = Expr::qualified("a", "id").eq(Expr::qualified("b", "a_id"));
        let once = restricted_condition(cond, a.deleted_at());
        let twice = restricted_condition(once, b.deleted_at());
        assert_eq!(
            sql(&twice),
            "\"a\".\"id\" = \"b\".\"a_id\" AND \"a\".\"deleted_at\" IS NULL AND \
             \"b\".\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_root_lookup() {
        let raw = Root::Table(table(true));
        assert!(raw.deleted_at_column().is_some());

        let plain = Root::Table(table(false));
        assert!(plain.deleted_at_column().is_none());

        let entity = Root::Entity {
            table: table(true),
            soft_delete: false,
        };
        assert!(entity.deleted_at_column().is_none());
    }
}
