//! Runtime relationship mapping.
//!
//! A `Mapper` is the configured form of a model: its table plus one
//! `RelationshipProperty` per declared `RelationshipInfo`. Each property owns
//! the join condition used for every way of loading it (lazy, dynamic and
//! joined eager loads), so rewriting that condition once is enough to hide
//! soft-deleted related rows everywhere.

use crate::expr::Expr;
use crate::join::{Join, JoinType};
use crate::query::Query;
use paranoid_core::{
    Column, Error, MappingErrorKind, Model, RelationshipInfo, RelationshipKind, Result, Table,
    Value,
};

/// Join condition of a relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    /// Parent to target (or parent to link table for many-to-many).
    pub primary: Option<Expr>,
    /// Link table to target, many-to-many only.
    pub secondary: Option<Expr>,
    /// Link table name, many-to-many only.
    pub secondary_table: Option<String>,
    /// `(local, remote)` column pairs in join order.
    ///
    /// Many-to-many: `(parent.pk, link.local)` then `(target.pk, link.remote)`.
    /// Many-to-one: `(parent.fk, target.pk)`. One-to-many: `(parent.pk, target.fk)`.
    pub local_remote_pairs: Vec<(Column, Column)>,
}

impl JoinCondition {
    fn unresolved(secondary_table: Option<String>) -> Self {
        Self {
            primary: None,
            secondary: None,
            secondary_table,
            local_remote_pairs: Vec::new(),
        }
    }

    /// Derive the join condition from relationship metadata.
    ///
    /// Keys that are not declared are inferred from foreign keys. When they
    /// cannot be resolved the condition has no primary join and no pairs.
    pub fn for_relationship(
        parent: &Table,
        info: &RelationshipInfo,
        target: &Table,
        secondary: Option<&Table>,
    ) -> Self {
        match info.kind {
            RelationshipKind::ManyToMany => many_to_many(parent, info, target, secondary),
            RelationshipKind::ManyToOne => many_to_one(parent, info, target),
            RelationshipKind::OneToMany => one_to_many(parent, info, target),
            RelationshipKind::OneToOne => {
                let local_side = if info.local_key_cols().is_empty()
                    && info.remote_key_cols().is_empty()
                {
                    !fk_columns(parent, target.source_name()).is_empty()
                } else {
                    !info.local_key_cols().is_empty()
                };
                if local_side {
                    many_to_one(parent, info, target)
                } else {
                    one_to_many(parent, info, target)
                }
            }
        }
    }
}

fn columns_named(table: &Table, names: &[&str]) -> Option<Vec<Column>> {
    names
        .iter()
        .map(|name| table.get(name).cloned())
        .collect()
}

fn fk_columns(from: &Table, to: &str) -> Vec<Column> {
    from.columns()
        .iter()
        .filter(|c| c.foreign_key.as_ref().is_some_and(|(t, _)| t == to))
        .cloned()
        .collect()
}

fn equalities(pairs: &[(Column, Column)], flip: bool) -> Option<Expr> {
    Expr::all(pairs.iter().map(|(a, b)| {
        if flip {
            Expr::column(b).eq(Expr::column(a))
        } else {
            Expr::column(a).eq(Expr::column(b))
        }
    }))
}

fn zip_pairs(left: Vec<Column>, right: Vec<Column>) -> Option<Vec<(Column, Column)>> {
    if left.is_empty() || left.len() != right.len() {
        return None;
    }
    Some(left.into_iter().zip(right).collect())
}

fn many_to_many(
    parent: &Table,
    info: &RelationshipInfo,
    target: &Table,
    secondary: Option<&Table>,
) -> JoinCondition {
    let (Some(link_info), Some(link)) = (info.link_table, secondary) else {
        return JoinCondition::unresolved(None);
    };
    let secondary_table = Some(link.name().to_string());

    let parent_pk: Vec<Column> = parent.primary_key().into_iter().cloned().collect();
    let target_pk: Vec<Column> = target.primary_key().into_iter().cloned().collect();
    let (Some(local), Some(remote)) = (
        columns_named(link, link_info.local_cols()),
        columns_named(link, link_info.remote_cols()),
    ) else {
        return JoinCondition::unresolved(secondary_table);
    };
    let (Some(primary_pairs), Some(secondary_pairs)) =
        (zip_pairs(parent_pk, local), zip_pairs(target_pk, remote))
    else {
        return JoinCondition::unresolved(secondary_table);
    };

    let primary = equalities(&primary_pairs, false);
    let secondary = equalities(&secondary_pairs, false);
    let mut pairs = primary_pairs;
    pairs.extend(secondary_pairs);
    JoinCondition {
        primary,
        secondary,
        secondary_table,
        local_remote_pairs: pairs,
    }
}

fn many_to_one(parent: &Table, info: &RelationshipInfo, target: &Table) -> JoinCondition {
    let local = if info.local_key_cols().is_empty() {
        Some(fk_columns(parent, target.source_name()))
    } else {
        columns_named(parent, info.local_key_cols())
    };
    let remote: Vec<Column> = target.primary_key().into_iter().cloned().collect();
    match local.and_then(|local| zip_pairs(local, remote)) {
        Some(pairs) => JoinCondition {
            primary: equalities(&pairs, true),
            secondary: None,
            secondary_table: None,
            local_remote_pairs: pairs,
        },
        None => JoinCondition::unresolved(None),
    }
}

fn one_to_many(parent: &Table, info: &RelationshipInfo, target: &Table) -> JoinCondition {
    let local: Vec<Column> = parent.primary_key().into_iter().cloned().collect();
    let remote = if info.remote_key_cols().is_empty() {
        Some(fk_columns(target, parent.name()))
    } else {
        columns_named(target, info.remote_key_cols())
    };
    match remote.and_then(|remote| zip_pairs(local, remote)) {
        Some(pairs) => JoinCondition {
            primary: equalities(&pairs, false),
            secondary: None,
            secondary_table: None,
            local_remote_pairs: pairs,
        },
        None => JoinCondition::unresolved(None),
    }
}

/// A configured relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipProperty {
    /// Declaring table
    pub parent: Table,
    /// Static declaration
    pub info: RelationshipInfo,
    /// Related table
    pub target: Table,
    /// Link table, many-to-many only
    pub secondary: Option<Table>,
    /// Join condition, rewritten when the mappers are configured
    pub join: JoinCondition,
}

impl RelationshipProperty {
    pub fn name(&self) -> &'static str {
        self.info.name
    }

    pub fn is_self_referential(&self) -> bool {
        self.parent.name() == self.target.source_name()
    }

    fn primary(&self) -> Result<&Expr> {
        self.join.primary.as_ref().ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::UnsupportedJoin,
                format!(
                    "relationship {}.{} has no join condition",
                    self.parent.name(),
                    self.name()
                ),
            )
        })
    }

    /// Join of the target table, under its alias for a self-referential
    /// relationship.
    fn target_join(&self, join_type: JoinType, on: Expr) -> Join {
        if self.target.is_alias() {
            Join::aliased(join_type, self.target.source_name(), self.target.name(), on)
        } else if join_type == JoinType::Inner {
            Join::inner(self.target.name(), on)
        } else {
            Join::left(self.target.name(), on)
        }
    }

    /// Outer join that brings the related rows into a parent query.
    ///
    /// Many-to-many renders as
    /// `LEFT JOIN (link INNER JOIN target ON secondary) ON primary`, so a
    /// deleted target drops the whole link row instead of leaving a
    /// null-extended link behind.
    pub fn eager_join(&self) -> Result<Join> {
        let primary = self.primary()?.clone();
        match (&self.secondary, &self.join.secondary) {
            (Some(link), Some(secondary)) => Ok(Join::group(
                JoinType::Left,
                link.name(),
                vec![self.target_join(JoinType::Inner, secondary.clone())],
                primary,
            )),
            _ => Ok(self.target_join(JoinType::Left, primary)),
        }
    }

    /// Query for the related rows of one parent.
    ///
    /// `parent_values` are the parent's persisted column values. The join
    /// condition is bound to them, so the query carries the rewritten
    /// soft-delete predicates of the relationship. For a self-referential
    /// relationship the parent columns are bound first and the target alias
    /// then becomes the queried table.
    pub fn query_for<T: Model>(&self, parent_values: &[(&str, Value)]) -> Result<Query<T>> {
        if T::TABLE_NAME != self.target.source_name() {
            return Err(Error::mapping(
                MappingErrorKind::UnknownTable,
                format!(
                    "relationship {}.{} targets '{}', not '{}'",
                    self.parent.name(),
                    self.name(),
                    self.target.source_name(),
                    T::TABLE_NAME
                ),
            ));
        }
        let lookup = |column: &str| {
            parent_values
                .iter()
                .find(|(name, _)| *name == column)
                .map(|(_, value)| value.clone())
        };
        let unalias = |expr: Expr| {
            if self.target.is_alias() {
                expr.rename_table(self.target.name(), self.target.source_name())
            } else {
                expr
            }
        };
        let bound = unalias(self.primary()?.bind_table(self.parent.name(), &lookup));

        let mut query = Query::<T>::new();
        if let (Some(link), Some(secondary)) = (&self.secondary, &self.join.secondary) {
            query = query.join(Join::inner(link.name(), unalias(secondary.clone())));
        }
        Ok(query.filter(bound))
    }
}

/// A configured model: its table and relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapper {
    pub table: Table,
    pub soft_delete: bool,
    pub relationships: Vec<RelationshipProperty>,
}

impl Mapper {
    /// Relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipProperty> {
        self.relationships.iter().find(|r| r.name() == name)
    }
}
