//! paranoid - transparent soft delete for Rust models.
//!
//! Rows of a soft-delete model are never removed by default. Deleting one
//! sets its `deleted_at` timestamp, and every read path leaves it out:
//!
//! - Queries restrict each root table to live rows when they are built
//! - Relationship joins are rewritten once, after all models are registered
//! - Point lookups by primary key report deleted rows as absent
//! - `with_deleted()` and `delete_hard` opt out explicitly
//!
//! # Quick Start
//!
//! ```ignore
//! use paranoid::prelude::*;
//!
//! #[derive(Model, Debug, Clone)]
//! #[paranoid(table = "user", soft_delete)]
//! struct User {
//!     id: Option<i64>,
//!     name: String,
//!     deleted_at: Option<i64>,
//! }
//!
//! let app = Paranoid::builder()
//!     .model::<User>()
//!     .model::<Group>()
//!     .table(user_group())
//!     .build(SqliteConnection::open_memory()?)?;
//! app.create_all(&cx).await;
//!
//! let mut session = app.session();
//! let key = session.add(&User::new("jeanphix"));
//! session.commit(&cx).await;
//!
//! let mut user = session.object::<User>(&key).unwrap();
//! session.delete(&mut user);          // UPDATE ... SET deleted_at = ...
//! session.commit(&cx).await;
//!
//! let live = app.query::<User>().all(&cx, app.connection()).await;      // []
//! let all = app.query::<User>().with_deleted().all(&cx, app.connection()).await;
//! ```

pub use paranoid_core::{
    Column, ColumnInfo, Cx, DELETED_AT, Error, FieldInfo, LinkTableInfo,
    MappingError, MappingErrorKind, Model, Outcome, QueryError, QueryErrorKind,
    ReferentialAction, RelationshipInfo, RelationshipKind, Result, Row, SchemaError,
    SchemaErrorKind, SoftDelete, SqlType, Table, TransactionError, TransactionErrorKind, Value,
    current_timestamp, hydrate, model_values,
};

pub use paranoid_query::{
    BinaryOp, Connection, Dialect, EagerLoader, Expr, Join, JoinCondition, JoinType, Loaded,
    Mapper, MapperRegistry, Mappers, OrderBy, OrderDirection, Query, RelationshipProperty,
    Select, Statement, TableQuery, not_deleted, query, restricted_condition,
};

pub use paranoid_session::{LinkAction, ObjectKey, ObjectState, Session, SessionConfig};

pub use paranoid_schema::{
    CreateTable, SchemaBuilder, create_all, create_table, drop_all, drop_table,
};

pub use paranoid_macros::Model;

pub use paranoid_sqlite::{MEMORY_PATH, SqliteConnection, sqlite_version};

mod app;
pub use app::{Paranoid, ParanoidBuilder};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use paranoid::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Composition
        Paranoid,
        ParanoidBuilder,
        // Core traits and types
        Connection,
        Cx,
        Error,
        Expr,
        FieldInfo,
        Join,
        Model,
        Outcome,
        Query,
        Result,
        Row,
        SoftDelete,
        SqlType,
        Table,
        Value,
        // Session
        Session,
        SessionConfig,
        SqliteConnection,
        // Macros
        query,
    };
}
