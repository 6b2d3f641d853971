//! JOIN clause types.
//!
//! Besides plain table joins this supports a nested join group,
//! `LEFT JOIN ("user_group" INNER JOIN "group" ON ...) ON ...`, which is how a
//! many-to-many relationship is eager loaded: the link table and the related
//! table are inner joined to each other, and the pair is outer joined to the
//! parent as a unit. A table joined to itself goes in under an alias.

use crate::expr::{Dialect, Expr};
use paranoid_core::Value;

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// Right-hand side of a join.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinSource {
    /// A single table.
    Table(String),
    /// A table under an alias: `"employee" AS "employee_manager"`.
    Aliased { table: String, alias: String },
    /// A table with its own joins, rendered in parentheses.
    Group { table: String, joins: Vec<Join> },
}

impl JoinSource {
    /// Every table this source brings into scope, in join order.
    pub fn tables(&self) -> Vec<&str> {
        match self {
            JoinSource::Table(name) => vec![name.as_str()],
            JoinSource::Aliased { alias, .. } => vec![alias.as_str()],
            JoinSource::Group { table, joins } => {
                let mut out = vec![table.as_str()];
                for join in joins {
                    out.extend(join.source.tables());
                }
                out
            }
        }
    }
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// What is joined
    pub source: JoinSource,
    /// ON condition
    pub on: Expr,
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            source: JoinSource::Table(table.into()),
            on,
        }
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Left,
            source: JoinSource::Table(table.into()),
            on,
        }
    }

    /// Join `table` under `alias`; `on` refers to the alias.
    pub fn aliased(
        join_type: JoinType,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: Expr,
    ) -> Self {
        Self {
            join_type,
            source: JoinSource::Aliased {
                table: table.into(),
                alias: alias.into(),
            },
            on,
        }
    }

    /// Join a parenthesized group: `table` followed by `joins`, attached with `on`.
    pub fn group(join_type: JoinType, table: impl Into<String>, joins: Vec<Join>, on: Expr) -> Self {
        Self {
            join_type,
            source: JoinSource::Group {
                table: table.into(),
                joins,
            },
            on,
        }
    }

    /// Tables this join brings into scope.
    pub fn tables(&self) -> Vec<&str> {
        self.source.tables()
    }

    /// Generate SQL for this JOIN clause, appending parameters to `params`.
    ///
    /// Parameters are numbered in textual order, so a group's inner ON
    /// conditions come before its outer ON condition.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let source = match &self.source {
            JoinSource::Table(name) => dialect.quote_identifier(name),
            JoinSource::Aliased { table, alias } => format!(
                "{} AS {}",
                dialect.quote_identifier(table),
                dialect.quote_identifier(alias)
            ),
            JoinSource::Group { table, joins } => {
                let mut sql = dialect.quote_identifier(table);
                for join in joins {
                    sql.push_str(&join.build(dialect, params));
                }
                format!("({sql})")
            }
        };
        let on = self.on.build_with_dialect(dialect, params, 0);
        format!(" {} {source} ON {on}", self.join_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_join() {
        let join = Join::inner(
            "team",
            Expr::qualified("team", "id").eq(Expr::qualified("hero", "team_id")),
        );
        let mut params = Vec::new();
        assert_eq!(
            join.build(Dialect::Postgres, &mut params),
            " INNER JOIN \"team\" ON \"team\".\"id\" = \"hero\".\"team_id\""
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_group_join() {
        let inner = Join::inner(
            "group",
            Expr::qualified("group", "id")
                .eq(Expr::qualified("user_group", "group_id"))
                .and(Expr::qualified("group", "deleted_at").is_null()),
        );
        let join = Join::group(
            JoinType::Left,
            "user_group",
            vec![inner],
            Expr::qualified("user", "id").eq(Expr::qualified("user_group", "user_id")),
        );
        let mut params = Vec::new();
        assert_eq!(
            join.build(Dialect::Postgres, &mut params),
            " LEFT JOIN (\"user_group\" INNER JOIN \"group\" ON \"group\".\"id\" = \
             \"user_group\".\"group_id\" AND \"group\".\"deleted_at\" IS NULL) ON \
             \"user\".\"id\" = \"user_group\".\"user_id\""
        );
        assert_eq!(join.tables(), vec!["user_group", "group"]);
    }

    #[test]
    fn test_aliased_join() {
        let join = Join::aliased(
            JoinType::Left,
            "employee",
            "employee_manager",
            Expr::qualified("employee_manager", "id").eq(Expr::qualified("employee", "manager_id")),
        );
        let mut params = Vec::new();
        assert_eq!(
            join.build(Dialect::Postgres, &mut params),
            " LEFT JOIN \"employee\" AS \"employee_manager\" ON \"employee_manager\".\"id\" =              \"employee\".\"manager_id\""
        );
        assert_eq!(join.tables(), vec!["employee_manager"]);
    }

    #[test]
    fn test_join_params_are_numbered_in_order() {
        let inner = Join::inner("b", Expr::qualified("b", "x").eq(1));
        let join = Join::group(JoinType::Left, "a", vec![inner], Expr::qualified("a", "y").eq(2));
        let mut params = Vec::new();
        let sql = join.build(Dialect::Sqlite, &mut params);
        assert!(sql.contains("\"b\".\"x\" = ?1"));
        assert!(sql.ends_with("\"a\".\"y\" = ?2"));
        assert_eq!(params, vec![Value::Int(1), Value::Int(2)]);
    }
}
