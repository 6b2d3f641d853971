//! Core types and traits for paranoid.
//!
//! This crate provides the foundational abstractions shared by the query,
//! session and schema layers:
//!
//! - `Model` trait for ORM-style struct mapping, with the `SOFT_DELETE` opt-in
//! - `SoftDelete` instance operations (`soft_delete`, `restore`)
//! - `Table`/`Column` runtime metadata, including the conditional `deleted_at`
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod error;
pub mod field;
pub mod identifiers;
pub mod model;
pub mod relationship;
pub mod row;
pub mod table;
pub mod types;
pub mod value;

pub use error::{
    Error, MappingError, MappingErrorKind, QueryError, QueryErrorKind, Result, SchemaError,
    SchemaErrorKind, TransactionError, TransactionErrorKind, TypeError,
};
pub use field::{FieldInfo, ReferentialAction};
pub use identifiers::{is_valid_identifier, quote_ident};
pub use model::{Model, SoftDelete, current_timestamp, hydrate, model_values};
pub use relationship::{
    LinkTableInfo, RelationshipInfo, RelationshipKind, find_relationship,
};
pub use row::{ColumnInfo, FromValue, Row, column_alias};
pub use table::{Column, DELETED_AT, Table};
pub use types::SqlType;
pub use value::{KeyValue, Value};
