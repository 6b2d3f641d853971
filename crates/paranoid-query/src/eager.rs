//! Eager loading of relationships.
//!
//! Eager loading fetches related objects in the same query with outer joins
//! built from the configured relationship conditions. Those conditions carry
//! the soft-delete rewrite, so deleted related rows never appear in a loaded
//! collection.

use paranoid_core::{
    Error, KeyValue, MappingErrorKind, Model, Result, Row, Value, find_relationship, hydrate,
};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Builder for eager loading configuration.
///
/// # Example
///
/// ```ignore
/// let groups = query!(Group)
///     .eager(EagerLoader::new().include("users"))
///     .all_eager(&cx, &conn)
///     .await;
/// ```
pub struct EagerLoader<T: Model> {
    includes: Vec<&'static str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for EagerLoader<T> {
    fn clone(&self) -> Self {
        Self {
            includes: self.includes.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> fmt::Debug for EagerLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerLoader")
            .field("model", &T::TABLE_NAME)
            .field("includes", &self.includes)
            .finish()
    }
}

impl<T: Model> EagerLoader<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            includes: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Include a relationship declared on `T`.
    ///
    /// Unknown names are kept and reported when the query runs.
    #[must_use]
    pub fn include(mut self, relationship: &'static str) -> Self {
        if find_relationship(T::RELATIONSHIPS, relationship).is_none() {
            tracing::warn!(
                model = T::TABLE_NAME,
                relationship,
                "eager include names an undeclared relationship"
            );
        }
        if !self.includes.contains(&relationship) {
            self.includes.push(relationship);
        }
        self
    }

    pub fn includes(&self) -> &[&'static str] {
        &self.includes
    }

    pub fn has_includes(&self) -> bool {
        !self.includes.is_empty()
    }
}

impl<T: Model> Default for EagerLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A model loaded together with the rows of its included relationships.
#[derive(Debug, Clone)]
pub struct Loaded<M> {
    pub model: M,
    related: HashMap<String, Vec<Row>>,
}

impl<M: Model> Loaded<M> {
    /// A model with nothing loaded alongside.
    pub(crate) fn bare(model: M) -> Self {
        Self {
            model,
            related: HashMap::new(),
        }
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Names of the relationships loaded with this model.
    pub fn loaded_relationships(&self) -> impl Iterator<Item = &str> {
        self.related.keys().map(String::as_str)
    }

    /// Raw rows of an included relationship, keyed by bare column name.
    pub fn related_rows(&self, name: &str) -> Option<&[Row]> {
        self.related.get(name).map(Vec::as_slice)
    }

    /// Hydrate the rows of an included relationship.
    #[allow(clippy::result_large_err)]
    pub fn related<C: Model>(&self, name: &str) -> Result<Vec<C>> {
        let rows = self.related.get(name).ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::UnknownRelationship,
                format!("relationship '{name}' of '{}' was not loaded", M::TABLE_NAME),
            )
        })?;
        rows.iter().map(hydrate::<C>).collect()
    }

    /// Hydrate a single-valued included relationship.
    #[allow(clippy::result_large_err)]
    pub fn related_one<C: Model>(&self, name: &str) -> Result<Option<C>> {
        Ok(self.related::<C>(name)?.into_iter().next())
    }
}

/// An included relationship as seen by the row grouper.
#[derive(Debug, Clone)]
pub(crate) struct IncludeSpec {
    pub name: String,
    pub table: String,
    pub primary_key: Vec<String>,
}

fn key_of(row: &Row, columns: &[String]) -> Vec<KeyValue> {
    columns
        .iter()
        .map(|c| row.get_by_name(c).unwrap_or(&Value::Null).to_key())
        .collect()
}

/// Fold joined rows into one `Loaded` per parent, in first-seen order.
///
/// Joins repeat the parent once per related row; parents are deduplicated
/// by primary key and related rows by theirs.
#[allow(clippy::result_large_err)]
pub(crate) fn group_rows<M: Model>(rows: &[Row], includes: &[IncludeSpec]) -> Result<Vec<Loaded<M>>> {
    let parent_pk: Vec<String> = M::PRIMARY_KEY.iter().map(|s| (*s).to_string()).collect();
    let mut order: Vec<Vec<KeyValue>> = Vec::new();
    let mut parents: HashMap<Vec<KeyValue>, (Loaded<M>, HashMap<String, Vec<Vec<KeyValue>>>)> =
        HashMap::new();

    for row in rows {
        let Some(parent_row) = row.subset_by_prefix(M::TABLE_NAME) else {
            continue;
        };
        let parent_key = key_of(&parent_row, &parent_pk);
        if !parents.contains_key(&parent_key) {
            let related = includes
                .iter()
                .map(|inc| (inc.name.clone(), Vec::new()))
                .collect();
            let loaded = Loaded {
                model: hydrate::<M>(&parent_row)?,
                related,
            };
            parents.insert(parent_key.clone(), (loaded, HashMap::new()));
            order.push(parent_key.clone());
        }
        let Some((loaded, seen)) = parents.get_mut(&parent_key) else {
            continue;
        };

        for include in includes {
            let Some(child) = row.subset_by_prefix(&include.table) else {
                continue;
            };
            let child_key = key_of(&child, &include.primary_key);
            let seen_keys = seen.entry(include.name.clone()).or_default();
            if seen_keys.contains(&child_key) {
                continue;
            }
            seen_keys.push(child_key);
            loaded
                .related
                .entry(include.name.clone())
                .or_default()
                .push(child);
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|key| parents.remove(&key).map(|(loaded, _)| loaded))
        .collect())
}
