//! Mapper registry and the relationship join rewrite.
//!
//! Models and raw tables are registered while the application declares its
//! schema. `configure` is the single checkpoint after which the mapping is
//! frozen: it builds every mapper, rewrites every relationship join so that
//! soft-deleted related rows are excluded, and stores the result. Later calls
//! return the same mappers.

use crate::mapper::{JoinCondition, Mapper, RelationshipProperty};
use crate::soft_delete::restricted_condition;
use paranoid_core::{Column, Error, MappingErrorKind, Model, RelationshipInfo, Result, Table};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone)]
struct PendingMapper {
    table: Table,
    soft_delete: bool,
    relationships: &'static [RelationshipInfo],
}

#[derive(Debug)]
enum RegistryState {
    Collecting {
        mappers: Vec<PendingMapper>,
        tables: Vec<Table>,
    },
    Configured(Mappers),
}

/// Collects mappers until `configure` freezes them.
#[derive(Debug)]
pub struct MapperRegistry {
    state: Mutex<RegistryState>,
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::Collecting {
                mappers: Vec::new(),
                tables: Vec::new(),
            }),
        }
    }

    /// Process-wide registry.
    pub fn global() -> &'static MapperRegistry {
        static GLOBAL: OnceLock<MapperRegistry> = OnceLock::new();
        GLOBAL.get_or_init(MapperRegistry::new)
    }

    /// Register model `M`. Registering the same table twice is a no-op.
    #[allow(clippy::result_large_err)]
    pub fn register<M: Model>(&self) -> Result<()> {
        let table = Table::of::<M>();
        table.validate()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *state {
            RegistryState::Collecting { mappers, tables } => {
                if mappers.iter().any(|m| m.table.name() == M::TABLE_NAME)
                    || tables.iter().any(|t| t.name() == M::TABLE_NAME)
                {
                    tracing::debug!(table = M::TABLE_NAME, "model already registered");
                    return Ok(());
                }
                tracing::debug!(
                    table = M::TABLE_NAME,
                    soft_delete = M::SOFT_DELETE,
                    relationships = M::RELATIONSHIPS.len(),
                    "registered model"
                );
                mappers.push(PendingMapper {
                    table,
                    soft_delete: M::SOFT_DELETE,
                    relationships: M::RELATIONSHIPS,
                });
                Ok(())
            }
            RegistryState::Configured(_) => Err(already_configured(M::TABLE_NAME)),
        }
    }

    /// Register a raw table (association tables, model-less tables).
    #[allow(clippy::result_large_err)]
    pub fn table(&self, table: Table) -> Result<()> {
        table.validate()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *state {
            RegistryState::Collecting { mappers, tables } => {
                if mappers.iter().any(|m| m.table.name() == table.name())
                    || tables.iter().any(|t| t.name() == table.name())
                {
                    tracing::debug!(table = table.name(), "table already registered");
                    return Ok(());
                }
                tracing::debug!(table = table.name(), "registered table");
                tables.push(table);
                Ok(())
            }
            RegistryState::Configured(_) => Err(already_configured(table.name())),
        }
    }

    /// Whether `configure` has completed.
    pub fn is_configured(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            RegistryState::Configured(_)
        )
    }

    /// The configured mappers, if `configure` has completed.
    pub fn configured(&self) -> Option<Mappers> {
        match &*self.state.lock().unwrap_or_else(|e| e.into_inner()) {
            RegistryState::Configured(mappers) => Some(mappers.clone()),
            RegistryState::Collecting { .. } => None,
        }
    }

    /// Build all mappers and rewrite their relationship joins.
    ///
    /// Runs once. On failure nothing is frozen and registration may continue.
    #[allow(clippy::result_large_err)]
    pub fn configure(&self) -> Result<Mappers> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mappers = match &*state {
            RegistryState::Configured(mappers) => return Ok(mappers.clone()),
            RegistryState::Collecting { mappers, tables } => build_mappers(mappers, tables)?,
        };
        tracing::info!(
            mappers = mappers.mappers().len(),
            tables = mappers.tables().len(),
            "mappers configured"
        );
        *state = RegistryState::Configured(mappers.clone());
        Ok(mappers)
    }
}

fn already_configured(table: &str) -> Error {
    Error::mapping(
        MappingErrorKind::AlreadyConfigured,
        format!("cannot register '{table}': mappers are already configured"),
    )
}

#[allow(clippy::result_large_err)]
fn lookup<'a>(tables: &'a [Table], name: &str) -> Result<&'a Table> {
    tables.iter().find(|t| t.name() == name).ok_or_else(|| {
        Error::mapping(
            MappingErrorKind::UnknownTable,
            format!("table '{name}' is not registered"),
        )
    })
}

#[allow(clippy::result_large_err)]
fn build_mappers(pending: &[PendingMapper], raw_tables: &[Table]) -> Result<Mappers> {
    let tables: Vec<Table> = pending
        .iter()
        .map(|m| m.table.clone())
        .chain(raw_tables.iter().cloned())
        .collect();
    let mut mappers = Vec::with_capacity(pending.len());
    for pending_mapper in pending {
        let mut relationships = Vec::with_capacity(pending_mapper.relationships.len());
        for info in pending_mapper.relationships {
            let parent = pending_mapper.table.name();
            let mut target = lookup(&tables, info.related_table)?.clone();
            let mut scope = None;
            if info.related_table == parent {
                let alias = format!("{parent}_{}", info.name);
                if lookup(&tables, &alias).is_ok() {
                    return Err(Error::mapping(
                        MappingErrorKind::UnsupportedJoin,
                        format!("{parent}.{}: alias '{alias}' clashes with a table", info.name),
                    ));
                }
                target = target.aliased(alias);
                let mut aliased = tables.clone();
                aliased.push(target.clone());
                scope = Some(aliased);
            }
            let secondary = match info.link_table {
                Some(link) => Some(lookup(&tables, link.table_name)?),
                None => None,
            };
            let mut join =
                JoinCondition::for_relationship(&pending_mapper.table, info, &target, secondary);
            rewrite_join_condition(&mut join, scope.as_deref().unwrap_or(&tables)).map_err(|e| match e {
                Error::Mapping(mut m) => {
                    m.message = format!(
                        "{}.{}: {}",
                        pending_mapper.table.name(),
                        info.name,
                        m.message
                    );
                    Error::Mapping(m)
                }
                other => other,
            })?;
            relationships.push(RelationshipProperty {
                parent: pending_mapper.table.clone(),
                info: *info,
                target,
                secondary: secondary.cloned(),
                join,
            });
        }
        mappers.push(Mapper {
            table: pending_mapper.table.clone(),
            soft_delete: pending_mapper.soft_delete,
            relationships,
        });
    }

    Ok(Mappers {
        inner: Arc::new(MappersInner { tables, mappers }),
    })
}

/// Restrict a relationship join so soft-deleted related rows never match.
///
/// With a secondary table the last `(local, remote)` pair belongs to the
/// secondary join, which is restricted by the `deleted_at` of both of its
/// tables; the remaining pair's remote table restricts the primary join.
/// Without one, the single pair's remote (target) table restricts the
/// primary join. Tables without `deleted_at` leave the condition unchanged.
#[allow(clippy::result_large_err)]
pub fn rewrite_join_condition(join: &mut JoinCondition, tables: &[Table]) -> Result<()> {
    let Some(primary) = join.primary.take() else {
        tracing::warn!("relationship has no primary join; soft-delete rewrite skipped");
        return Ok(());
    };
    if join.local_remote_pairs.is_empty() {
        tracing::warn!("relationship join has no local/remote pairs; soft-delete rewrite skipped");
        join.primary = Some(primary);
        return Ok(());
    }

    let expected = if join.secondary.is_some() { 2 } else { 1 };
    if join.local_remote_pairs.len() != expected {
        let count = join.local_remote_pairs.len();
        join.primary = Some(primary);
        return Err(Error::mapping(
            MappingErrorKind::UnsupportedJoin,
            format!("expected {expected} local/remote pair(s), found {count} (composite keys)"),
        ));
    }

    let deleted_at = |column: &Column| -> Result<Option<Column>> {
        Ok(lookup(tables, &column.table)?.deleted_at().cloned())
    };

    let mut pairs = join.local_remote_pairs.clone();
    if let Some(secondary) = join.secondary.take() {
        let mut rewritten = secondary;
        if let Some((local, remote)) = pairs.pop() {
            rewritten = restricted_condition(rewritten, deleted_at(&local)?.as_ref());
            rewritten = restricted_condition(rewritten, deleted_at(&remote)?.as_ref());
        }
        join.secondary = Some(rewritten);
    }

    let mut rewritten = primary;
    if let Some((_, remote)) = pairs.pop() {
        rewritten = restricted_condition(rewritten, deleted_at(&remote)?.as_ref());
    }
    join.primary = Some(rewritten);
    Ok(())
}

#[derive(Debug)]
struct MappersInner {
    tables: Vec<Table>,
    mappers: Vec<Mapper>,
}

/// Frozen result of `MapperRegistry::configure`. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Mappers {
    inner: Arc<MappersInner>,
}

impl Mappers {
    /// Every registered table, models first, in registration order.
    pub fn tables(&self) -> &[Table] {
        &self.inner.tables
    }

    pub fn mappers(&self) -> &[Mapper] {
        &self.inner.mappers
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.inner.tables.iter().find(|t| t.name() == name)
    }

    pub fn mapper(&self, table: &str) -> Option<&Mapper> {
        self.inner.mappers.iter().find(|m| m.table.name() == table)
    }

    /// Relationship `name` declared on `table`.
    #[allow(clippy::result_large_err)]
    pub fn relationship(&self, table: &str, name: &str) -> Result<&RelationshipProperty> {
        let mapper = self.mapper(table).ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::UnknownTable,
                format!("no mapper for table '{table}'"),
            )
        })?;
        mapper.relationship(name).ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::UnknownRelationship,
                format!("'{table}' has no relationship '{name}'"),
            )
        })
    }
}
