//! Soft-delete aware session for paranoid.
//!
//! `paranoid-session` is the **unit-of-work layer**. It tracks objects,
//! turns `delete` into a `deleted_at` update for soft-delete models, and
//! writes pending changes through a `Connection` at flush.
//!
//! # Role In The Architecture
//!
//! - **Identity map**: one tracked copy per primary key; reads through the
//!   session still hide soft-deleted objects.
//! - **Soft delete**: `delete` on a soft-delete model sets `deleted_at` and
//!   schedules an UPDATE; the row is never removed. `delete_hard` always
//!   removes it.
//! - **Relationships**: lazy loads and association rows go through the
//!   configured mappers, whose join conditions exclude deleted related rows.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(conn).with_mappers(mappers);
//!
//! session.add(&user);
//! session.commit(&cx).await;
//!
//! // Soft delete: the row stays, default reads stop returning it.
//! assert!(session.delete(&mut user));
//! session.commit(&cx).await;
//! ```

pub mod flush;
pub mod identity_map;

pub use flush::LinkAction;
pub use identity_map::{ObjectKey, ObjectState};

use crate::flush::{LinkEnd, LinkOp, delete_statement, insert_statement, update_statement};
use crate::identity_map::TrackedObject;
use asupersync::{Cx, Outcome};
use paranoid_core::{
    Error, MappingErrorKind, Model, Result, SoftDelete, Table, Value, current_timestamp,
    model_values,
};
use paranoid_query::{Connection, MapperRegistry, Mappers, Query, RelationshipProperty, Statement};
use std::collections::HashMap;

/// Configuration for Session behavior.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Whether to begin a transaction on the first flush.
    pub auto_begin: bool,
    /// Whether to flush before reads.
    pub auto_flush: bool,
    /// Source of soft-delete timestamps, in microseconds since the Unix epoch.
    pub clock: fn() -> i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_begin: true,
            auto_flush: false,
            clock: current_timestamp,
        }
    }
}

/// The Session is the central unit-of-work manager.
pub struct Session<C: Connection> {
    connection: C,
    config: SessionConfig,
    mappers: Option<Mappers>,
    in_transaction: bool,
    identity_map: HashMap<ObjectKey, TrackedObject>,
    /// Transient keys of inserted objects, mapped to their persisted keys.
    aliases: HashMap<ObjectKey, ObjectKey>,
    next_transient: u64,
    pending_new: Vec<ObjectKey>,
    pending_dirty: Vec<ObjectKey>,
    pending_delete: Vec<ObjectKey>,
    pending_links: Vec<LinkOp>,
}

impl<C: Connection> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("in_transaction", &self.in_transaction)
            .field("tracked", &self.identity_map.len())
            .field("pending_new", &self.pending_new.len())
            .field("pending_dirty", &self.pending_dirty.len())
            .field("pending_delete", &self.pending_delete.len())
            .field("pending_links", &self.pending_links.len())
            .finish_non_exhaustive()
    }
}

macro_rules! propagate {
    ($outcome:expr) => {
        match $outcome {
            Outcome::Ok(value) => value,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

impl<C: Connection> Session<C> {
    /// Create a new session from an existing connection.
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, SessionConfig::default())
    }

    /// Create a new session with custom configuration.
    pub fn with_config(connection: C, config: SessionConfig) -> Self {
        Self {
            connection,
            config,
            mappers: None,
            in_transaction: false,
            identity_map: HashMap::new(),
            aliases: HashMap::new(),
            next_transient: 0,
            pending_new: Vec::new(),
            pending_dirty: Vec::new(),
            pending_delete: Vec::new(),
            pending_links: Vec::new(),
        }
    }

    /// Use these mappers for relationships instead of the global ones.
    #[must_use]
    pub fn with_mappers(mut self, mappers: Mappers) -> Self {
        self.mappers = Some(mappers);
        self
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[allow(clippy::result_large_err)]
    fn mappers(&self) -> Result<Mappers> {
        self.mappers
            .clone()
            .or_else(|| MapperRegistry::global().configured())
            .ok_or_else(|| {
                Error::mapping(
                    MappingErrorKind::NotConfigured,
                    "relationships require configured mappers",
                )
            })
    }

    // ========================================================================
    // Object Tracking
    // ========================================================================

    /// Key under which `obj` is (or would be) tracked.
    ///
    /// `None` for an object whose primary key is not set yet. Such objects
    /// are only reachable through the key `add` returned for them.
    fn find_key<M: Model>(&self, obj: &M) -> Option<ObjectKey> {
        let pk = obj.primary_key_value();
        if pk.is_empty() || pk.iter().any(Value::is_null) {
            return None;
        }
        Some(ObjectKey::from_pk::<M>(&pk))
    }

    fn resolve(&self, key: &ObjectKey) -> ObjectKey {
        self.aliases.get(key).cloned().unwrap_or_else(|| key.clone())
    }

    fn queue_dirty(&mut self, key: &ObjectKey) {
        if !self.pending_dirty.contains(key) {
            self.pending_dirty.push(key.clone());
        }
    }

    /// Add an object to the session.
    ///
    /// A new object is INSERTed at the next flush. Adding an object whose
    /// primary key is already tracked replaces the tracked copy (and undoes a
    /// pending hard delete). Every object without a primary key is a new
    /// pending insert, even when its values equal another one's. The returned
    /// key stays valid after the insert, see `object`.
    pub fn add<M: Model + Clone>(&mut self, obj: &M) -> ObjectKey {
        if let Some(key) = self.find_key(obj) {
            if let Some(tracked) = self.identity_map.get_mut(&key) {
                tracked.update_from(obj);
                match tracked.state {
                    ObjectState::Deleted => {
                        tracked.state = ObjectState::Persistent;
                        self.pending_delete.retain(|k| k != &key);
                        self.queue_dirty(&key);
                    }
                    ObjectState::Persistent => self.queue_dirty(&key),
                    ObjectState::New => {}
                }
                return key;
            }
        }

        let key = match self.find_key(obj) {
            Some(key) => key,
            None => {
                self.next_transient += 1;
                ObjectKey::transient::<M>(self.next_transient)
            }
        };
        self.identity_map
            .insert(key.clone(), TrackedObject::new(obj, ObjectState::New));
        self.pending_new.push(key.clone());
        key
    }

    /// Add multiple objects to the session at once.
    pub fn add_all<'a, M, I>(&mut self, objects: I) -> Vec<ObjectKey>
    where
        M: Model + Clone,
        I: IntoIterator<Item = &'a M>,
    {
        objects.into_iter().map(|obj| self.add(obj)).collect()
    }

    /// The tracked copy of an object, e.g. to read a generated primary key
    /// after flush.
    pub fn object<M: Model + Clone>(&self, key: &ObjectKey) -> Option<M> {
        self.identity_map.get(&self.resolve(key))?.get::<M>()
    }

    /// Track `obj` as loaded from the database, unless it already is.
    fn attach<M: Model + Clone>(&mut self, obj: &M) -> Option<ObjectKey> {
        let key = self.find_key(obj)?;
        self.identity_map
            .entry(key.clone())
            .or_insert_with(|| TrackedObject::new(obj, ObjectState::Persistent));
        Some(key)
    }

    /// Record a changed tracked object for UPDATE.
    ///
    /// An untracked object with a primary key is attached as persistent
    /// first; an object marked for hard delete is left alone.
    fn track_update<M: Model + Clone>(&mut self, obj: &M) {
        let key = match self.find_key(obj) {
            Some(key) if self.identity_map.contains_key(&key) => key,
            _ => {
                let Some(key) = self.attach(obj) else {
                    tracing::warn!(
                        table = M::TABLE_NAME,
                        "object without a primary key is not tracked; use its session key"
                    );
                    return;
                };
                if let Some(tracked) = self.identity_map.get_mut(&key) {
                    // The database still holds the pre-change values.
                    tracked.original_state = None;
                }
                key
            }
        };
        self.update_tracked(&key, obj);
    }

    fn update_tracked<M: Model + Clone>(&mut self, key: &ObjectKey, obj: &M) {
        let Some(tracked) = self.identity_map.get_mut(key) else {
            return;
        };
        match tracked.state {
            ObjectState::Deleted => {}
            ObjectState::New => tracked.update_from(obj),
            ObjectState::Persistent => {
                tracked.update_from(obj);
                self.queue_dirty(key);
            }
        }
    }

    /// Mark an object as modified so it is UPDATEd on flush.
    pub fn mark_dirty<M: Model + Clone>(&mut self, obj: &M) {
        self.track_update(obj);
    }

    /// Delete an object.
    ///
    /// For soft-delete models `deleted_at` is set on `obj` right away and
    /// persisted as an UPDATE; the row survives the flush and `true` is
    /// returned. Other models are physically deleted (see `delete_hard`) and
    /// `false` is returned.
    ///
    /// A pending insert without a primary key cannot be told apart from other
    /// pending inserts by value; delete it through `delete_key`.
    pub fn delete<M: Model + Clone>(&mut self, obj: &mut M) -> bool {
        if !M::SOFT_DELETE {
            return self.delete_hard(obj);
        }
        obj.set_deleted_at(Some((self.config.clock)()));
        tracing::info!(
            table = M::TABLE_NAME,
            pk = ?obj.primary_key_value(),
            "soft deleted"
        );
        self.track_update(obj);
        true
    }

    /// Physically delete an object, soft-delete model or not.
    ///
    /// A pending insert is simply dropped; a persisted object gets a DELETE
    /// at flush. Always returns `false`.
    pub fn delete_hard<M: Model + Clone>(&mut self, obj: &M) -> bool {
        let Some(key) = self.find_key(obj) else {
            tracing::warn!(
                table = M::TABLE_NAME,
                "object without a primary key is not tracked; use its session key"
            );
            return false;
        };
        if !self.identity_map.contains_key(&key) {
            self.identity_map
                .insert(key.clone(), TrackedObject::new(obj, ObjectState::Persistent));
        }
        self.hard_delete_key(&key);
        tracing::debug!(table = M::TABLE_NAME, pk = ?obj.primary_key_value(), "hard delete queued");
        false
    }

    fn hard_delete_key(&mut self, key: &ObjectKey) {
        let state = self.identity_map.get(key).map(|t| t.state);
        match state {
            Some(ObjectState::New) => {
                self.identity_map.remove(key);
                self.pending_new.retain(|k| k != key);
            }
            Some(ObjectState::Persistent) => {
                if let Some(tracked) = self.identity_map.get_mut(key) {
                    tracked.state = ObjectState::Deleted;
                }
                self.pending_dirty.retain(|k| k != key);
                if !self.pending_delete.contains(key) {
                    self.pending_delete.push(key.clone());
                }
            }
            Some(ObjectState::Deleted) | None => {}
        }
    }

    /// Delete the tracked object under `key`, as `delete` would.
    ///
    /// This is how a pending insert without a primary key is deleted: only
    /// the object `add` returned `key` for is affected. Returns `true` for a
    /// soft delete and `false` for a hard delete or an unknown key.
    pub fn delete_key<M: Model + Clone>(&mut self, key: &ObjectKey) -> bool {
        let key = self.resolve(key);
        let Some(mut obj) = self.identity_map.get(&key).and_then(|t| t.get::<M>()) else {
            tracing::warn!(table = M::TABLE_NAME, "delete of an untracked session key");
            return false;
        };
        if !M::SOFT_DELETE {
            self.hard_delete_key(&key);
            tracing::debug!(table = M::TABLE_NAME, pk = ?obj.primary_key_value(), "hard delete queued");
            return false;
        }
        obj.set_deleted_at(Some((self.config.clock)()));
        tracing::info!(
            table = M::TABLE_NAME,
            pk = ?obj.primary_key_value(),
            "soft deleted"
        );
        self.update_tracked(&key, &obj);
        true
    }

    /// `delete_hard` when `hard`, otherwise `delete`.
    pub fn delete_with<M: Model + Clone>(&mut self, obj: &mut M, hard: bool) -> bool {
        if hard {
            self.delete_hard(obj)
        } else {
            self.delete(obj)
        }
    }

    /// Clear `deleted_at` on `obj` and persist it at the next flush.
    pub fn restore<M: Model + Clone>(&mut self, obj: &mut M) {
        obj.restore();
        self.track_update(obj);
    }

    /// Whether `obj` is tracked by this session.
    pub fn contains<M: Model>(&self, obj: &M) -> bool {
        self.find_key(obj)
            .is_some_and(|key| self.identity_map.contains_key(&key))
    }

    /// State of a tracked object.
    pub fn object_state<M: Model>(&self, obj: &M) -> Option<ObjectState> {
        let key = self.find_key(obj)?;
        self.state(&key)
    }

    /// State of the object tracked under `key`.
    pub fn state(&self, key: &ObjectKey) -> Option<ObjectState> {
        self.identity_map.get(&self.resolve(key)).map(|t| t.state)
    }

    /// Forget every tracked object and pending change.
    pub fn expunge_all(&mut self) {
        self.identity_map.clear();
        self.aliases.clear();
        self.pending_new.clear();
        self.pending_dirty.clear();
        self.pending_delete.clear();
        self.pending_links.clear();
    }

    pub fn pending_new_count(&self) -> usize {
        self.pending_new.len()
    }

    pub fn pending_dirty_count(&self) -> usize {
        self.pending_dirty.len()
    }

    pub fn pending_delete_count(&self) -> usize {
        self.pending_delete.len()
    }

    pub fn pending_link_count(&self) -> usize {
        self.pending_links.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.identity_map.len()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    // ========================================================================
    // Reads
    // ========================================================================

    async fn auto_flush(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.config.auto_flush {
            self.flush(cx).await
        } else {
            Outcome::Ok(())
        }
    }

    /// Soft-delete aware query for `M`, wired to this session's mappers.
    pub fn query<M: Model>(&self) -> Query<M> {
        let query = Query::<M>::new();
        match &self.mappers {
            Some(mappers) => query.with_mappers(mappers.clone()),
            None => query,
        }
    }

    /// Get an object by primary key.
    ///
    /// A soft-deleted object is reported as absent, whether it comes from the
    /// identity map or from the database.
    pub async fn get<M: Model + Clone>(
        &mut self,
        cx: &Cx,
        pk: impl Into<Value>,
    ) -> Outcome<Option<M>, Error> {
        self.lookup::<M>(cx, vec![pk.into()], false).await
    }

    /// Get an object by primary key, soft-deleted or not.
    pub async fn get_with_deleted<M: Model + Clone>(
        &mut self,
        cx: &Cx,
        pk: impl Into<Value>,
    ) -> Outcome<Option<M>, Error> {
        self.lookup::<M>(cx, vec![pk.into()], true).await
    }

    /// Get an object by composite primary key.
    pub async fn get_by_pk<M: Model + Clone>(
        &mut self,
        cx: &Cx,
        pk: &[Value],
        include_deleted: bool,
    ) -> Outcome<Option<M>, Error> {
        self.lookup::<M>(cx, pk.to_vec(), include_deleted).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(table = M::TABLE_NAME))]
    async fn lookup<M: Model + Clone>(
        &mut self,
        cx: &Cx,
        pk: Vec<Value>,
        include_deleted: bool,
    ) -> Outcome<Option<M>, Error> {
        propagate!(self.auto_flush(cx).await);

        let key = ObjectKey::from_pk::<M>(&pk);
        if let Some(tracked) = self.identity_map.get(&key) {
            return match tracked.state {
                ObjectState::Deleted => Outcome::Ok(None),
                ObjectState::New | ObjectState::Persistent => Outcome::Ok(
                    tracked
                        .get::<M>()
                        .filter(|obj| include_deleted || obj.deleted_at().is_none()),
                ),
            };
        }

        let query = if include_deleted {
            Query::<M>::including_deleted()
        } else {
            Query::<M>::new()
        };
        let found = propagate!(query.get_by_key(cx, &self.connection, &pk).await);
        if let Some(obj) = &found {
            self.attach(obj);
        }
        Outcome::Ok(found)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    #[allow(clippy::result_large_err)]
    fn relationship<P: Model>(&self, name: &str) -> Result<(Mappers, RelationshipProperty)> {
        let mappers = self.mappers()?;
        let prop = mappers.relationship(P::TABLE_NAME, name)?.clone();
        Ok((mappers, prop))
    }

    /// Query for the related objects of `parent`.
    ///
    /// The query is built from the rewritten join condition, so deleted
    /// related rows never match, and it is itself restricted on `T`.
    #[allow(clippy::result_large_err)]
    pub fn related_query<P: Model, T: Model>(&self, parent: &P, name: &str) -> Result<Query<T>> {
        let (mappers, prop) = self.relationship::<P>(name)?;
        let parent_values = self.current_values(parent);
        Ok(prop.query_for::<T>(&parent_values)?.with_mappers(mappers))
    }

    /// Load the related objects of `parent` (lazy loading).
    #[tracing::instrument(level = "debug", skip(self, cx, parent), fields(parent = P::TABLE_NAME))]
    pub async fn load_related<P: Model, T: Model>(
        &mut self,
        cx: &Cx,
        parent: &P,
        name: &str,
    ) -> Outcome<Vec<T>, Error> {
        propagate!(self.auto_flush(cx).await);
        let query = match self.related_query::<P, T>(parent, name) {
            Ok(query) => query,
            Err(e) => return Outcome::Err(e),
        };
        query.all(cx, &self.connection).await
    }

    /// Values of `obj` as the session knows them (generated keys included).
    fn current_values<M: Model>(&self, obj: &M) -> Vec<(&'static str, Value)> {
        self.find_key(obj)
            .and_then(|key| self.identity_map.get(&key))
            .map_or_else(|| model_values(obj), |t| t.values.clone())
    }

    #[allow(clippy::result_large_err)]
    fn link_end<M: Model>(&self, obj: &M, source: &str, link_column: &str) -> Result<LinkEnd> {
        let Some(key) = self.find_key(obj) else {
            return Err(Error::mapping(
                MappingErrorKind::UnknownTable,
                format!(
                    "cannot link a '{}' without a primary key; link it by its session key",
                    M::TABLE_NAME
                ),
            ));
        };
        Ok(LinkEnd {
            key: Some(key),
            values: model_values(obj),
            source: source.to_string(),
            link_column: link_column.to_string(),
        })
    }

    #[allow(clippy::result_large_err)]
    fn key_end<M: Model>(&self, key: &ObjectKey, source: &str, link_column: &str) -> Result<LinkEnd> {
        let key = self.resolve(key);
        let Some(tracked) = self.identity_map.get(&key).filter(|_| key.is_type::<M>()) else {
            return Err(Error::mapping(
                MappingErrorKind::UnknownTable,
                format!("no tracked '{}' under this session key", M::TABLE_NAME),
            ));
        };
        Ok(LinkEnd {
            values: tracked.values.clone(),
            key: Some(key),
            source: source.to_string(),
            link_column: link_column.to_string(),
        })
    }

    /// Link table and (parent, child) column pairs of a many-to-many
    /// relationship of `P` targeting `T`.
    #[allow(clippy::result_large_err)]
    fn link_columns<P: Model, T: Model>(
        &self,
        name: &str,
    ) -> Result<(Table, [(String, String); 2])> {
        let (_, prop) = self.relationship::<P>(name)?;
        let pairs = &prop.join.local_remote_pairs;
        let (Some(link), [parent_pair, child_pair]) = (&prop.secondary, pairs.as_slice()) else {
            return Err(Error::mapping(
                MappingErrorKind::UnsupportedJoin,
                format!(
                    "{}.{} has no association table to link through",
                    P::TABLE_NAME,
                    name
                ),
            ));
        };
        if prop.target.source_name() != T::TABLE_NAME {
            return Err(Error::mapping(
                MappingErrorKind::UnknownTable,
                format!(
                    "{}.{} targets '{}', not '{}'",
                    P::TABLE_NAME,
                    name,
                    prop.target.source_name(),
                    T::TABLE_NAME
                ),
            ));
        }
        Ok((
            link.clone(),
            [
                (parent_pair.0.name.clone(), parent_pair.1.name.clone()),
                (child_pair.0.name.clone(), child_pair.1.name.clone()),
            ],
        ))
    }

    #[allow(clippy::result_large_err)]
    fn queue_link<P: Model, T: Model>(
        &mut self,
        action: LinkAction,
        parent: &P,
        name: &str,
        child: &T,
    ) -> Result<()> {
        let (table, [(parent_source, parent_link), (child_source, child_link)]) =
            self.link_columns::<P, T>(name)?;
        let ends = [
            self.link_end(parent, &parent_source, &parent_link)?,
            self.link_end(child, &child_source, &child_link)?,
        ];
        self.pending_links.push(LinkOp { action, table, ends });
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn queue_key_link<P: Model, T: Model>(
        &mut self,
        action: LinkAction,
        parent: &ObjectKey,
        name: &str,
        child: &ObjectKey,
    ) -> Result<()> {
        let (table, [(parent_source, parent_link), (child_source, child_link)]) =
            self.link_columns::<P, T>(name)?;
        let ends = [
            self.key_end::<P>(parent, &parent_source, &parent_link)?,
            self.key_end::<T>(child, &child_source, &child_link)?,
        ];
        self.pending_links.push(LinkOp { action, table, ends });
        Ok(())
    }

    /// Associate `child` with `parent` through a many-to-many relationship.
    ///
    /// Both objects need a primary key; pending inserts without one are
    /// related by session key through `relate_keys`. The association row is
    /// inserted at flush, after pending inserts.
    #[allow(clippy::result_large_err)]
    pub fn relate<P: Model, T: Model>(&mut self, parent: &P, name: &str, child: &T) -> Result<()> {
        self.queue_link(LinkAction::Insert, parent, name, child)
    }

    /// Remove the association row between `parent` and `child`.
    #[allow(clippy::result_large_err)]
    pub fn unrelate<P: Model, T: Model>(
        &mut self,
        parent: &P,
        name: &str,
        child: &T,
    ) -> Result<()> {
        self.queue_link(LinkAction::Delete, parent, name, child)
    }

    /// `relate` for tracked objects identified by their session keys.
    #[allow(clippy::result_large_err)]
    pub fn relate_keys<P: Model, T: Model>(
        &mut self,
        parent: &ObjectKey,
        name: &str,
        child: &ObjectKey,
    ) -> Result<()> {
        self.queue_key_link::<P, T>(LinkAction::Insert, parent, name, child)
    }

    /// `unrelate` for tracked objects identified by their session keys.
    #[allow(clippy::result_large_err)]
    pub fn unrelate_keys<P: Model, T: Model>(
        &mut self,
        parent: &ObjectKey,
        name: &str,
        child: &ObjectKey,
    ) -> Result<()> {
        self.queue_key_link::<P, T>(LinkAction::Delete, parent, name, child)
    }

    fn end_value(&self, end: &LinkEnd) -> Value {
        if let Some(tracked) = end
            .key
            .as_ref()
            .and_then(|key| self.identity_map.get(&self.resolve(key)))
        {
            return tracked.value(&end.source);
        }
        end.values
            .iter()
            .find(|(name, _)| *name == end.source)
            .map_or(Value::Null, |(_, value)| value.clone())
    }

    // ========================================================================
    // Transaction Management
    // ========================================================================

    async fn execute(&self, cx: &Cx, statement: &Statement) -> Outcome<u64, Error> {
        let (sql, params) = statement.to_sql(self.connection.dialect());
        tracing::debug!(sql = %sql, params = params.len(), "flush");
        self.connection.execute(cx, statement).await
    }

    /// Begin a transaction.
    pub async fn begin(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.in_transaction {
            return Outcome::Ok(());
        }
        propagate!(self.connection.begin(cx).await);
        self.in_transaction = true;
        Outcome::Ok(())
    }

    /// Flush pending changes to the database.
    ///
    /// This executes INSERT, UPDATE, and DELETE statements but does NOT
    /// commit. A failing statement stops the flush; it and everything after
    /// it stay pending.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn flush(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.config.auto_begin && !self.in_transaction {
            propagate!(self.begin(cx).await);
        }

        // 1. Inserts
        while let Some(key) = self.pending_new.first().cloned() {
            let Some(tracked) = self.identity_map.get(&key) else {
                self.pending_new.remove(0);
                continue;
            };
            let statement = insert_statement(tracked);
            let (sql, _) = statement.to_sql(self.connection.dialect());
            tracing::debug!(sql = %sql, "flush");
            let generated = propagate!(self.connection.insert(cx, &statement).await);
            self.pending_new.remove(0);

            let Some(mut tracked) = self.identity_map.remove(&key) else {
                continue;
            };
            if let Some(id) = generated.filter(|_| tracked.has_null_pk()) {
                tracked.assign_id(id);
            }
            tracked.mark_persisted();
            let persisted = tracked.pk_values();
            let new_key = key.rekey(&persisted);
            if new_key != key {
                self.aliases.insert(key, new_key.clone());
            }
            self.identity_map.insert(new_key, tracked);
        }

        // 2. Association rows
        propagate!(self.flush_links(cx, LinkAction::Insert).await);

        // 3. Updates
        while let Some(key) = self.pending_dirty.first().cloned() {
            if let Some(tracked) = self
                .identity_map
                .get(&key)
                .filter(|t| t.state == ObjectState::Persistent && t.is_modified())
            {
                let statement = update_statement(tracked);
                propagate!(self.execute(cx, &statement).await);
            }
            self.pending_dirty.remove(0);
            if let Some(tracked) = self.identity_map.get_mut(&key) {
                if tracked.state == ObjectState::Persistent {
                    tracked.mark_persisted();
                }
            }
        }

        // 4. Association rows going away
        propagate!(self.flush_links(cx, LinkAction::Delete).await);

        // 5. Deletes
        while let Some(key) = self.pending_delete.first().cloned() {
            if let Some(tracked) = self.identity_map.get(&key) {
                let statement = delete_statement(tracked);
                propagate!(self.execute(cx, &statement).await);
            }
            self.pending_delete.remove(0);
            self.identity_map.remove(&key);
        }

        Outcome::Ok(())
    }

    async fn flush_links(&mut self, cx: &Cx, action: LinkAction) -> Outcome<(), Error> {
        while let Some(index) = self.pending_links.iter().position(|op| op.action == action) {
            let op = &self.pending_links[index];
            let values = [self.end_value(&op.ends[0]), self.end_value(&op.ends[1])];
            let statement = op.statement(values);
            propagate!(self.execute(cx, &statement).await);
            self.pending_links.remove(index);
        }
        Outcome::Ok(())
    }

    /// Flush and commit the current transaction.
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        propagate!(self.flush(cx).await);
        if self.in_transaction {
            propagate!(self.connection.commit(cx).await);
            self.in_transaction = false;
        }
        tracing::debug!(tracked = self.identity_map.len(), "committed");
        Outcome::Ok(())
    }

    /// Roll back the current transaction.
    ///
    /// Pending changes are dropped and every tracked object is forgotten, so
    /// the next read goes to the database.
    pub async fn rollback(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.in_transaction {
            propagate!(self.connection.rollback(cx).await);
            self.in_transaction = false;
        }
        self.expunge_all();
        tracing::debug!("rolled back");
        Outcome::Ok(())
    }
}
