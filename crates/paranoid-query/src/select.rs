//! SELECT statement.
//!
//! `Select` is the untyped statement shape that connections execute. Every
//! projected column is aliased `<table>__<column>` so rows from joined tables
//! can be split apart again with `Row::subset_by_prefix`.

use crate::clause::{Limit, Offset, OrderBy, Where};
use crate::expr::{Dialect, Expr};
use crate::join::Join;
use paranoid_core::{Table, Value, column_alias};

/// Alias of the single column produced by a COUNT query.
pub const COUNT_ALIAS: &str = "count";

/// One item of the SELECT list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `"table"."column" AS "table__column"`
    Column { table: String, column: String },
    /// `COUNT(*) AS "count"`
    CountStar,
}

/// A SELECT statement over one or more root tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    roots: Vec<String>,
    projection: Vec<Projection>,
    joins: Vec<Join>,
    filter: Option<Where>,
    order_by: Vec<OrderBy>,
    limit: Option<Limit>,
    offset: Option<Offset>,
    distinct: bool,
    /// Projection a COUNT replaced; a DISTINCT count still needs it.
    counted: Vec<Projection>,
}

impl Select {
    /// Select every column of `table`.
    pub fn from(table: &Table) -> Self {
        let mut select = Self::default();
        select.add_root(table);
        select
    }

    /// Add another table to the FROM list and project its columns.
    pub fn add_root(&mut self, table: &Table) {
        self.roots.push(table.name().to_string());
        self.project_table(table);
    }

    /// Project every column of `table` (a root or a joined table).
    pub fn project_table(&mut self, table: &Table) {
        for column in table.columns() {
            let projection = Projection::Column {
                table: table.name().to_string(),
                column: column.name.clone(),
            };
            if !self.projection.contains(&projection) {
                self.projection.push(projection);
            }
        }
    }

    /// Turn this statement into a row count of its result.
    #[must_use]
    pub fn count(mut self) -> Self {
        if !self.is_count() {
            self.counted = std::mem::replace(&mut self.projection, vec![Projection::CountStar]);
        }
        self.order_by.clear();
        self
    }

    /// Add a WHERE condition, ANDed with any existing one.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Add a JOIN clause.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Add ORDER BY clause.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set LIMIT.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Set OFFSET.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    /// Set DISTINCT.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn filter_expr(&self) -> Option<&Expr> {
        self.filter.as_ref().map(Where::expr)
    }

    /// Whether this is a COUNT statement.
    pub fn is_count(&self) -> bool {
        self.projection == [Projection::CountStar]
    }

    /// Build the SQL query and parameters (PostgreSQL dialect).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.to_sql(Dialect::Postgres)
    }

    /// Build the SQL query and parameters for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = if self.is_count() && self.needs_subquery_count() {
            let inner = Select {
                projection: self.counted.clone(),
                ..self.clone()
            };
            let columns = if self.distinct {
                inner.projection_sql(dialect)
            } else {
                "1".to_string()
            };
            let inner_sql = inner.build_body(dialect, &mut params, &columns);
            format!(
                "SELECT COUNT(*) AS {} FROM ({inner_sql}) AS {}",
                dialect.quote_identifier(COUNT_ALIAS),
                dialect.quote_identifier("counted")
            )
        } else {
            let columns = self.projection_sql(dialect);
            self.build_body(dialect, &mut params, &columns)
        };
        (sql, params)
    }

    fn needs_subquery_count(&self) -> bool {
        self.distinct || self.limit.is_some() || self.offset.is_some()
    }

    fn projection_sql(&self, dialect: Dialect) -> String {
        if self.projection.is_empty() {
            return "*".to_string();
        }
        self.projection
            .iter()
            .map(|p| match p {
                Projection::Column { table, column } => format!(
                    "{}.{} AS {}",
                    dialect.quote_identifier(table),
                    dialect.quote_identifier(column),
                    dialect.quote_identifier(&column_alias(table, column))
                ),
                Projection::CountStar => {
                    format!("COUNT(*) AS {}", dialect.quote_identifier(COUNT_ALIAS))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn build_body(&self, dialect: Dialect, params: &mut Vec<Value>, columns: &str) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(columns);

        let from = self
            .roots
            .iter()
            .map(|t| dialect.quote_identifier(t))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" FROM ");
        sql.push_str(&from);

        for join in &self.joins {
            sql.push_str(&join.build(dialect, params));
        }

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.build(dialect, params));
        }

        if !self.order_by.is_empty() {
            let terms: Vec<_> = self
                .order_by
                .iter()
                .map(|o| o.build(dialect, params))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(Limit(n)) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(Offset(n)) = self.offset {
            sql.push_str(&format!(" OFFSET {n}"));
        }
        sql
    }
}
