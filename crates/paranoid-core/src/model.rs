//! Model trait for ORM-style struct mapping.
//!
//! The `Model` trait defines the contract for structs that can be mapped to
//! database tables. Models opt into soft delete with `SOFT_DELETE`; the
//! `deleted_at` column then exists on the table and is carried through
//! `deleted_at()` / `set_deleted_at()`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::Result;
use crate::field::FieldInfo;
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::table::DELETED_AT;
use crate::value::Value;

/// Trait for types that can be mapped to database tables.
///
/// # Example
///
/// ```
/// use paranoid_core::{FieldInfo, Model, Result, Row, SqlType, Value};
///
/// struct User {
///     id: Option<i64>,
///     name: String,
///     deleted_at: Option<i64>,
/// }
///
/// impl Model for User {
///     const TABLE_NAME: &'static str = "user";
///     const PRIMARY_KEY: &'static [&'static str] = &["id"];
///     const SOFT_DELETE: bool = true;
///
///     fn fields() -> &'static [FieldInfo] {
///         static FIELDS: &[FieldInfo] = &[
///             FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
///             FieldInfo::new("name", "name", SqlType::Text),
///         ];
///         FIELDS
///     }
///
///     fn to_row(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("name", self.name.clone().into())]
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self {
///             id: row.get_named("id")?,
///             name: row.get_named("name")?,
///             deleted_at: None,
///         })
///     }
///
///     fn primary_key_value(&self) -> Vec<Value> {
///         vec![self.id.into()]
///     }
///
///     fn is_new(&self) -> bool {
///         self.id.is_none()
///     }
///
///     fn deleted_at(&self) -> Option<i64> {
///         self.deleted_at
///     }
///
///     fn set_deleted_at(&mut self, value: Option<i64>) {
///         self.deleted_at = value;
///     }
/// }
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// The primary key column name(s).
    const PRIMARY_KEY: &'static [&'static str];

    /// Relationship metadata for this model.
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[];

    /// Whether rows of this model are soft deleted.
    ///
    /// When true the table carries a nullable `deleted_at` column, default
    /// queries hide rows where it is set, and session deletes set it instead
    /// of removing the row.
    const SOFT_DELETE: bool = false;

    /// Get field metadata for all declared columns.
    ///
    /// `deleted_at` is not listed here; it is added from `SOFT_DELETE`.
    fn fields() -> &'static [FieldInfo];

    /// Convert this model instance to a row of values (without `deleted_at`).
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a database row.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Get the value of the primary key field(s).
    fn primary_key_value(&self) -> Vec<Value>;

    /// Check if this is a new record (primary key is None/default).
    fn is_new(&self) -> bool;

    /// Store a database-generated integer primary key after insert.
    fn set_id(&mut self, _id: i64) {}

    /// Deletion timestamp in microseconds since the Unix epoch (UTC).
    fn deleted_at(&self) -> Option<i64> {
        None
    }

    /// Store the deletion timestamp. Ignored by models without soft delete.
    fn set_deleted_at(&mut self, _value: Option<i64>) {}
}

/// Current UTC time in microseconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
}

/// Column values to persist for `obj`, including `deleted_at` for
/// soft-delete models.
pub fn model_values<M: Model>(obj: &M) -> Vec<(&'static str, Value)> {
    let mut values = obj.to_row();
    if M::SOFT_DELETE && !values.iter().any(|(name, _)| *name == DELETED_AT) {
        values.push((DELETED_AT, obj.deleted_at().map_or(Value::Null, Value::TimestampTz)));
    }
    values
}

/// Build a model from a row, restoring `deleted_at` when the row carries it.
#[allow(clippy::result_large_err)]
pub fn hydrate<M: Model>(row: &Row) -> Result<M> {
    let mut obj = M::from_row(row)?;
    if M::SOFT_DELETE && row.contains_column(DELETED_AT) {
        obj.set_deleted_at(row.get_named::<Option<i64>>(DELETED_AT)?);
    }
    Ok(obj)
}

/// Instance-level soft delete, independent of any session.
///
/// Implemented for every `Model`; on models without `SOFT_DELETE` the
/// mutations have nowhere to store the timestamp and do nothing.
pub trait SoftDelete: Model {
    /// Set `deleted_at` to now. Calling it again refreshes the timestamp.
    fn soft_delete(&mut self) {
        self.set_deleted_at(Some(current_timestamp()));
        tracing::info!(
            table = Self::TABLE_NAME,
            pk = ?self.primary_key_value(),
            "soft deleted"
        );
    }

    /// Clear `deleted_at`.
    fn restore(&mut self) {
        self.set_deleted_at(None);
        tracing::info!(
            table = Self::TABLE_NAME,
            pk = ?self.primary_key_value(),
            "restored"
        );
    }

    /// Whether `deleted_at` is set.
    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

impl<M: Model> SoftDelete for M {}
