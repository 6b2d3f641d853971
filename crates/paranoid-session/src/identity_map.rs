//! Identity map entries.
//!
//! Each tracked object is stored type-erased together with the column values
//! it will be persisted with and a serialized snapshot of the values last
//! written to (or read from) the database. Comparing the two snapshots is how
//! the session detects dirty objects at flush.

use paranoid_core::{KeyValue, Model, Table, Value, model_values};
use std::any::{Any, TypeId};

/// What identifies an object within its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyId {
    /// Primary key values of a persisted object.
    Pk(Vec<KeyValue>),
    /// Serial of a pending object whose key the database will generate.
    Transient(u64),
}

/// Unique key for an object in the identity map.
///
/// Persisted objects are keyed by their primary key values, so two distinct
/// rows never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    type_id: TypeId,
    id: KeyId,
}

impl ObjectKey {
    /// Key of a persisted object.
    pub fn from_pk<M: Model>(pk: &[Value]) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            id: KeyId::Pk(pk.iter().map(Value::to_key).collect()),
        }
    }

    /// Key for a new object whose primary key the database will generate.
    pub(crate) fn transient<M: Model>(serial: u64) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            id: KeyId::Transient(serial),
        }
    }

    /// Same type, keyed by a persisted primary key.
    pub(crate) fn rekey(&self, pk: &[Value]) -> Self {
        Self {
            type_id: self.type_id,
            id: KeyId::Pk(pk.iter().map(Value::to_key).collect()),
        }
    }

    pub fn is_type<M: Model>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    /// Whether this key stands for an object not yet inserted.
    pub fn is_transient(&self) -> bool {
        matches!(self.id, KeyId::Transient(_))
    }

    /// Primary key values, or `None` for a transient key.
    pub fn pk(&self) -> Option<&[KeyValue]> {
        match &self.id {
            KeyId::Pk(values) => Some(values),
            KeyId::Transient(_) => None,
        }
    }
}

/// State of a tracked object in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Needs INSERT on flush.
    New,
    /// Loaded from or written to the database.
    Persistent,
    /// Needs DELETE on flush.
    Deleted,
}

type AssignId = fn(&mut (dyn Any + Send + Sync), i64) -> Option<Vec<(&'static str, Value)>>;

fn assign_id<M: Model>(
    object: &mut (dyn Any + Send + Sync),
    id: i64,
) -> Option<Vec<(&'static str, Value)>> {
    let obj = object.downcast_mut::<M>()?;
    obj.set_id(id);
    Some(model_values(obj))
}

/// Serialized column values, compared to detect modifications.
pub(crate) fn snapshot(values: &[(&'static str, Value)]) -> Option<Vec<u8>> {
    serde_json::to_vec(values).ok()
}

/// A tracked object in the session.
pub(crate) struct TrackedObject {
    pub object: Box<dyn Any + Send + Sync>,
    /// Snapshot of the values the database holds; `None` until inserted.
    pub original_state: Option<Vec<u8>>,
    pub state: ObjectState,
    pub table: Table,
    /// Values to persist, `deleted_at` included for soft-delete models.
    pub values: Vec<(&'static str, Value)>,
    pub pk_columns: &'static [&'static str],
    assign_id: AssignId,
}

impl TrackedObject {
    pub fn new<M: Model + Clone>(obj: &M, state: ObjectState) -> Self {
        let values = model_values(obj);
        let original_state = match state {
            ObjectState::New => None,
            ObjectState::Persistent | ObjectState::Deleted => snapshot(&values),
        };
        Self {
            object: Box::new(obj.clone()),
            original_state,
            state,
            table: Table::of::<M>(),
            values,
            pk_columns: M::PRIMARY_KEY,
            assign_id: assign_id::<M>,
        }
    }

    /// Replace the tracked copy with `obj`.
    pub fn update_from<M: Model + Clone>(&mut self, obj: &M) {
        self.object = Box::new(obj.clone());
        self.values = model_values(obj);
    }

    pub fn get<M: Model + Clone>(&self) -> Option<M> {
        self.object.downcast_ref::<M>().cloned()
    }

    pub fn value(&self, column: &str) -> Value {
        self.values
            .iter()
            .find(|(name, _)| *name == column)
            .map_or(Value::Null, |(_, value)| value.clone())
    }

    pub fn pk_values(&self) -> Vec<Value> {
        self.pk_columns.iter().map(|c| self.value(c)).collect()
    }

    pub fn has_null_pk(&self) -> bool {
        self.pk_values().iter().any(Value::is_null)
    }

    /// Store a generated primary key on the tracked copy.
    pub fn assign_id(&mut self, id: i64) {
        if let Some(values) = (self.assign_id)(self.object.as_mut(), id) {
            self.values = values;
        }
    }

    /// Whether the values differ from what the database holds.
    pub fn is_modified(&self) -> bool {
        match &self.original_state {
            Some(original) => snapshot(&self.values).as_ref() != Some(original),
            None => true,
        }
    }

    /// Record the current values as persisted.
    pub fn mark_persisted(&mut self) {
        self.original_state = snapshot(&self.values);
        self.state = ObjectState::Persistent;
    }
}

impl std::fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedObject")
            .field("table", &self.table.name())
            .field("state", &self.state)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}
