//! Soft-delete aware query layer for paranoid.
//!
//! `paranoid-query` turns `Model` metadata into statements that never see
//! soft-deleted rows unless asked to.
//!
//! # Role In The Architecture
//!
//! - **Predicate injection**: `Query` restricts each root with
//!   `deleted_at IS NULL` when it is built; `with_deleted()` opts out.
//! - **Relationship rewrite**: `MapperRegistry::configure` rewrites every
//!   relationship join once so deleted related rows are excluded from lazy
//!   and eager loads.
//! - **Statements**: `Select` and `Statement` are the structured form that a
//!   `Connection` executes or renders for its `Dialect`.

pub mod clause;
pub mod connection;
pub mod eager;
pub mod expr;
pub mod join;
pub mod mapper;
pub mod query;
pub mod registry;
pub mod select;
pub mod soft_delete;
pub mod statement;

pub use clause::{Limit, Offset, OrderBy, OrderDirection, Where};
pub use connection::Connection;
pub use eager::{EagerLoader, Loaded};
pub use expr::{BinaryOp, Dialect, Expr};
pub use join::{Join, JoinSource, JoinType};
pub use mapper::{JoinCondition, Mapper, RelationshipProperty};
pub use query::{Query, TableQuery};
pub use registry::{MapperRegistry, Mappers, rewrite_join_condition};
pub use select::{COUNT_ALIAS, Projection, Select};
pub use soft_delete::{Root, deleted_at_column, not_deleted, restricted_condition};
pub use statement::{Statement, create_table_sql};

/// Create a soft-delete aware query for a model.
///
/// # Example
///
/// ```ignore
/// let live = query!(User)
///     .order_by(Expr::qualified("user", "name").asc())
///     .all(&cx, &conn)
///     .await;
/// ```
#[macro_export]
macro_rules! query {
    ($model:ty) => {
        $crate::Query::<$model>::new()
    };
}
