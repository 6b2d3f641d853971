//! SQL expressions for query building.
//!
//! This module provides the expression tree used for WHERE clauses, join
//! conditions and ORDER BY. Expressions render to SQL for any `Dialect`, and
//! the relationship rewriter walks them structurally to find the tables a
//! join condition touches.

use crate::clause::{OrderBy, OrderDirection};
use paranoid_core::{Column, Value};

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Both dialects use double quotes; embedded `"` is doubled.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => paranoid_core::quote_ident(name),
        }
    }
}

/// A SQL expression that can be used in WHERE, ON, ORDER BY.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// IN expression
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE / NOT LIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },

    /// Parenthesized expression
    Paren(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Get the precedence of this operator (higher = binds tighter).
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
        }
    }

    /// AND and OR may be regrouped without changing meaning.
    const fn is_associative(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create an unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Create a table-qualified column reference.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Reference a registered table column.
    pub fn column(column: &Column) -> Self {
        Expr::qualified(column.table.clone(), column.name.clone())
    }

    /// Create a literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a NULL literal.
    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    // ==================== Comparison Operators ====================

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Not equal to (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal to (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal to (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    // ==================== Logical Operators ====================

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical NOT
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// AND together a list of expressions; `None` for an empty list.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        exprs.into_iter().reduce(Expr::and)
    }

    // ==================== Null Checks ====================

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    // ==================== Pattern Matching ====================

    /// LIKE pattern match (`%` and `_` wildcards)
    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: false,
        }
    }

    /// NOT LIKE pattern match
    pub fn not_like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: true,
        }
    }

    // ==================== IN ====================

    /// IN list of values
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// NOT IN list of values
    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    // ==================== Ordering ====================

    /// Create ascending ORDER BY expression
    pub fn asc(self) -> OrderBy {
        OrderBy {
            expr: self,
            direction: OrderDirection::Asc,
        }
    }

    /// Create descending ORDER BY expression
    pub fn desc(self) -> OrderBy {
        OrderBy {
            expr: self,
            direction: OrderDirection::Desc,
        }
    }

    // ==================== Utility ====================

    /// Wrap expression in parentheses.
    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    /// Rebuild the expression with each column passed through `f`; columns
    /// for which `f` returns `None` are kept.
    fn map_columns(&self, f: &dyn Fn(Option<&str>, &str) -> Option<Expr>) -> Expr {
        match self {
            Expr::Column { table, name } => {
                f(table.as_deref(), name).unwrap_or_else(|| self.clone())
            }
            Expr::Literal(_) => self.clone(),
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.map_columns(f)),
                op: *op,
                right: Box::new(right.map_columns(f)),
            },
            Expr::Not(inner) => Expr::Not(Box::new(inner.map_columns(f))),
            Expr::In {
                expr,
                values,
                negated,
            } => Expr::In {
                expr: Box::new(expr.map_columns(f)),
                values: values.iter().map(|v| v.map_columns(f)).collect(),
                negated: *negated,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.map_columns(f)),
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => Expr::Like {
                expr: Box::new(expr.map_columns(f)),
                pattern: pattern.clone(),
                negated: *negated,
            },
            Expr::Paren(inner) => Expr::Paren(Box::new(inner.map_columns(f))),
        }
    }

    /// Replace every column of `table` with the literal produced by `lookup`.
    ///
    /// Columns the lookup does not know become NULL. This turns a join
    /// condition into a filter for one known parent row.
    pub fn bind_table(&self, table: &str, lookup: &dyn Fn(&str) -> Option<Value>) -> Expr {
        self.map_columns(&|t, name| {
            (t == Some(table)).then(|| Expr::Literal(lookup(name).unwrap_or(Value::Null)))
        })
    }

    /// Requalify every column of `from` with `to`.
    pub fn rename_table(&self, from: &str, to: &str) -> Expr {
        self.map_columns(&|t, name| (t == Some(from)).then(|| Expr::qualified(to, name)))
    }

    /// Whether this expression mentions any column of `table`.
    pub fn references_table(&self, table: &str) -> bool {
        match self {
            Expr::Column { table: Some(t), .. } => t == table,
            Expr::Column { .. } | Expr::Literal(_) => false,
            Expr::Binary { left, right, .. } => {
                left.references_table(table) || right.references_table(table)
            }
            Expr::Not(inner) | Expr::Paren(inner) => inner.references_table(table),
            Expr::In { expr, values, .. } => {
                expr.references_table(table) || values.iter().any(|v| v.references_table(table))
            }
            Expr::IsNull { expr, .. } | Expr::Like { expr, .. } => expr.references_table(table),
        }
    }

    // ==================== SQL Generation ====================

    /// Build SQL string and collect parameters (default PostgreSQL dialect).
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        self.build_with_dialect(Dialect::Postgres, params, offset)
    }

    /// Build SQL string with specific dialect.
    ///
    /// Operands of lower precedence than their parent operator are wrapped in
    /// parentheses, so `a OR b` ANDed with another condition renders as
    /// `(a OR b) AND c`.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        match self {
            Expr::Column { table, name } => {
                if let Some(t) = table {
                    format!(
                        "{}.{}",
                        dialect.quote_identifier(t),
                        dialect.quote_identifier(name)
                    )
                } else {
                    dialect.quote_identifier(name)
                }
            }

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(offset + params.len())
            }

            Expr::Binary { left, op, right } => {
                let left_sql = operand_sql(left, *op, false, dialect, params, offset);
                let right_sql = operand_sql(right, *op, true, dialect, params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::Not(expr) => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                if matches!(**expr, Expr::Binary { .. }) {
                    format!("NOT ({expr_sql})")
                } else {
                    format!("NOT {expr_sql}")
                }
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let value_sqls: Vec<_> = values
                    .iter()
                    .map(|v| v.build_with_dialect(dialect, params, offset))
                    .collect();
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                params.push(Value::Text(pattern.clone()));
                let param = dialect.placeholder(offset + params.len());
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}LIKE {param}")
            }

            Expr::Paren(expr) => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                format!("({expr_sql})")
            }
        }
    }
}

fn operand_sql(
    operand: &Expr,
    parent: BinaryOp,
    is_right: bool,
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> String {
    let sql = operand.build_with_dialect(dialect, params, offset);
    let needs_parens = match operand {
        Expr::Binary { op, .. } => {
            op.precedence() < parent.precedence()
                || (is_right && *op == parent && !parent.is_associative())
                || (op.precedence() == parent.precedence() && *op != parent)
        }
        _ => false,
    };
    if needs_parens { format!("({sql})") } else { sql }
}

// Conversion from Value to Expr
impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(expr: &Expr) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        (sql, params)
    }

    #[test]
    fn test_column_qualified() {
        let (s, params) = sql(&Expr::qualified("user", "name"));
        assert_eq!(s, "\"user\".\"name\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_eq_literal() {
        let (s, params) = sql(&Expr::qualified("user", "id").eq(3_i64));
        assert_eq!(s, "\"user\".\"id\" = $1");
        assert_eq!(params, vec![Value::BigInt(3)]);
    }

    #[test]
    fn test_is_null_and() {
        let expr = Expr::qualified("user", "deleted_at")
            .is_null()
            .and(Expr::qualified("user", "id").eq(1_i64));
        let (s, _) = sql(&expr);
        assert_eq!(s, "\"user\".\"deleted_at\" IS NULL AND \"user\".\"id\" = $1");
    }

    #[test]
    fn test_or_under_and_is_parenthesized() {
        let or = Expr::col("a").eq(1).or(Expr::col("b").eq(2));
        let expr = Expr::col("deleted_at").is_null().and(or);
        let (s, params) = sql(&expr);
        assert_eq!(s, "\"deleted_at\" IS NULL AND (\"a\" = $1 OR \"b\" = $2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_and_chain_has_no_extra_parens() {
        let expr = Expr::col("a")
            .eq(1)
            .and(Expr::col("b").eq(2))
            .and(Expr::col("c").is_null());
        let (s, _) = sql(&expr);
        assert_eq!(s, "\"a\" = $1 AND \"b\" = $2 AND \"c\" IS NULL");
    }

    #[test]
    fn test_not_binary_is_parenthesized() {
        let (s, _) = sql(&Expr::col("a").eq(1).not());
        assert_eq!(s, "NOT (\"a\" = $1)");
    }

    #[test]
    fn test_in_and_like() {
        let (s, params) = sql(&Expr::col("id").in_list(vec![1_i64, 2, 3]));
        assert_eq!(s, "\"id\" IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);

        let (s, params) = sql(&Expr::col("name").like("jean%"));
        assert_eq!(s, "\"name\" LIKE $1");
        assert_eq!(params, vec![Value::Text("jean%".into())]);
    }

    #[test]
    fn test_dialect_placeholders() {
        let expr = Expr::col("a").eq(1).and(Expr::col("b").eq(2));
        let mut params = Vec::new();
        assert_eq!(
            expr.build_with_dialect(Dialect::Sqlite, &mut params, 0),
            "\"a\" = ?1 AND \"b\" = ?2"
        );
        let mut params = Vec::new();
        assert_eq!(
            expr.build_with_dialect(Dialect::Postgres, &mut params, 0),
            "\"a\" = $1 AND \"b\" = $2"
        );
    }

    #[test]
    fn test_offset_shifts_placeholders() {
        let mut params = Vec::new();
        let s = Expr::col("a").eq(1).build(&mut params, 2);
        assert_eq!(s, "\"a\" = $3");
    }

    #[test]
    fn test_bind_table() {
        let join = Expr::qualified("group", "id")
            .eq(Expr::qualified("user_group", "group_id"))
            .and(Expr::qualified("group", "deleted_at").is_null());
        let lookup = |name: &str| (name == "id").then_some(Value::BigInt(5));
        let bound = join.bind_table("group", &lookup);

        assert!(!bound.references_table("group"));
        assert!(bound.references_table("user_group"));
        let (s, params) = sql(&bound);
        assert_eq!(s, "$1 = \"user_group\".\"group_id\" AND $2 IS NULL");
        assert_eq!(params, vec![Value::BigInt(5), Value::Null]);
    }

    #[test]
    fn test_rename_table() {
        let join = Expr::qualified("employee_manager", "id")
            .eq(Expr::qualified("employee", "manager_id"))
            .and(Expr::qualified("employee_manager", "deleted_at").is_null());
        let lookup = |name: &str| (name == "manager_id").then_some(Value::BigInt(1));
        let renamed = join
            .bind_table("employee", &lookup)
            .rename_table("employee_manager", "employee");

        assert!(!renamed.references_table("employee_manager"));
        let (s, params) = sql(&renamed);
        assert_eq!(
            s,
            "\"employee\".\"id\" = $1 AND \"employee\".\"deleted_at\" IS NULL"
        );
        assert_eq!(params, vec![Value::BigInt(1)]);
    }

    #[test]
    fn test_all_reduces_with_and() {
        assert!(Expr::all(Vec::new()).is_none());
        let expr = Expr::all(vec![Expr::col("a").is_null(), Expr::col("b").is_null()]).unwrap();
        let (s, _) = sql(&expr);
        assert_eq!(s, "\"a\" IS NULL AND \"b\" IS NULL");
    }
}
