//! Relationship metadata.
//!
//! Relationships are declared as static metadata on each `Model`. The mapper
//! layer turns them into runtime join conditions once every table is known,
//! and rewrites those conditions so related soft-deleted rows stay hidden.

/// Cardinality of a relationship, seen from the declaring model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// The foreign key lives on either side; resolved from the declared keys.
    OneToOne,
    /// The declaring table holds the foreign key.
    #[default]
    ManyToOne,
    /// The target table holds the foreign key.
    OneToMany,
    /// An association table holds a key to each side.
    ManyToMany,
}

/// Association table of a many-to-many relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTableInfo {
    pub table_name: &'static str,
    /// Link column referencing the declaring model
    pub local_column: &'static str,
    /// Link column referencing the target model
    pub remote_column: &'static str,
    pub local_columns: Option<&'static [&'static str]>,
    pub remote_columns: Option<&'static [&'static str]>,
}

impl LinkTableInfo {
    #[must_use]
    pub const fn new(
        table_name: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    ) -> Self {
        Self {
            table_name,
            local_column,
            remote_column,
            local_columns: None,
            remote_columns: None,
        }
    }

    /// Association table keyed by several columns per side.
    ///
    /// Such relationships are registered but rejected when the mappers are
    /// configured, since their joins cannot be restricted pair by pair.
    #[must_use]
    pub const fn composite(
        table_name: &'static str,
        local_columns: &'static [&'static str],
        remote_columns: &'static [&'static str],
    ) -> Self {
        Self {
            table_name,
            local_column: "",
            remote_column: "",
            local_columns: Some(local_columns),
            remote_columns: Some(remote_columns),
        }
    }

    pub fn local_cols(&self) -> &[&'static str] {
        columns(self.local_columns, &self.local_column)
    }

    pub fn remote_cols(&self) -> &[&'static str] {
        columns(self.remote_columns, &self.remote_column)
    }
}

fn columns<'a>(many: Option<&'a [&'static str]>, one: &'a &'static str) -> &'a [&'static str] {
    match many {
        Some(cols) => cols,
        None if one.is_empty() => &[],
        None => std::slice::from_ref(one),
    }
}

/// A relationship declared on a model.
///
/// Keys left unset are inferred from the foreign keys of the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipInfo {
    /// Name used to load or include the relationship
    pub name: &'static str,
    pub related_table: &'static str,
    pub kind: RelationshipKind,
    /// Foreign key column(s) on the declaring table (many-to-one)
    pub local_key: Option<&'static str>,
    pub local_keys: Option<&'static [&'static str]>,
    /// Foreign key column(s) on the target table (one-to-many)
    pub remote_key: Option<&'static str>,
    pub remote_keys: Option<&'static [&'static str]>,
    pub link_table: Option<LinkTableInfo>,
    /// Name of the inverse relationship on the target, if declared.
    pub back_populates: Option<&'static str>,
}

impl RelationshipInfo {
    #[must_use]
    pub const fn new(
        name: &'static str,
        related_table: &'static str,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            name,
            related_table,
            kind,
            local_key: None,
            local_keys: None,
            remote_key: None,
            remote_keys: None,
            link_table: None,
            back_populates: None,
        }
    }

    pub fn local_key_cols(&self) -> &[&'static str] {
        match (self.local_keys, &self.local_key) {
            (Some(keys), _) => keys,
            (None, Some(key)) => std::slice::from_ref(key),
            (None, None) => &[],
        }
    }

    pub fn remote_key_cols(&self) -> &[&'static str] {
        match (self.remote_keys, &self.remote_key) {
            (Some(keys), _) => keys,
            (None, Some(key)) => std::slice::from_ref(key),
            (None, None) => &[],
        }
    }

    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = Some(key);
        self.local_keys = None;
        self
    }

    #[must_use]
    pub const fn local_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.local_keys = Some(keys);
        self.local_key = None;
        self
    }

    #[must_use]
    pub const fn remote_key(mut self, key: &'static str) -> Self {
        self.remote_key = Some(key);
        self.remote_keys = None;
        self
    }

    #[must_use]
    pub const fn remote_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.remote_keys = Some(keys);
        self.remote_key = None;
        self
    }

    #[must_use]
    pub const fn link_table(mut self, info: LinkTableInfo) -> Self {
        self.link_table = Some(info);
        self
    }

    #[must_use]
    pub const fn back_populates(mut self, field: &'static str) -> Self {
        self.back_populates = Some(field);
        self
    }
}

/// Relationship named `name` in a model's declarations.
pub fn find_relationship<'a>(
    relationships: &'a [RelationshipInfo],
    name: &str,
) -> Option<&'a RelationshipInfo> {
    relationships.iter().find(|r| r.name == name)
}
