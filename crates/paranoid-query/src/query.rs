//! Soft-delete aware queries.
//!
//! A query restricts itself to live rows when it is built: every root that
//! has a `deleted_at` column gets `deleted_at IS NULL` as the first term of
//! the WHERE clause. Later filters are ANDed on, so nothing a caller adds
//! can widen the result back to deleted rows. Use `with_deleted()` to look
//! at everything.

use crate::clause::OrderBy;
use crate::connection::Connection;
use crate::eager::{EagerLoader, IncludeSpec, Loaded, group_rows};
use crate::expr::{Dialect, Expr};
use crate::join::Join;
use crate::registry::{MapperRegistry, Mappers};
use crate::select::{COUNT_ALIAS, Select};
use crate::soft_delete::{Root, not_deleted};
use asupersync::{Cx, Outcome};
use paranoid_core::{
    Column, Error, MappingErrorKind, Model, Result, Row, Table, Value, hydrate,
};
use std::fmt;

/// Roots plus the restricted SELECT built over them.
#[derive(Debug, Clone, PartialEq)]
struct Restricted {
    roots: Vec<Root>,
    select: Select,
    include_deleted: bool,
    soft_delete_columns: Vec<Column>,
}

impl Restricted {
    fn new(roots: Vec<Root>, include_deleted: bool) -> Self {
        let mut restricted = Self {
            roots: Vec::with_capacity(roots.len()),
            select: Select::default(),
            include_deleted,
            soft_delete_columns: Vec::new(),
        };
        for root in roots {
            restricted.push_root(root);
        }
        restricted
    }

    fn push_root(&mut self, root: Root) {
        self.select.add_root(root.table());
        if !self.include_deleted {
            if let Some(column) = root.deleted_at_column() {
                let select = std::mem::take(&mut self.select);
                self.select = select.filter(not_deleted(column));
                self.soft_delete_columns.push(column.clone());
            }
        }
        self.roots.push(root);
    }

    fn with_deleted(&self) -> Self {
        Self::new(self.roots.clone(), true)
    }

    fn map_select(mut self, f: impl FnOnce(Select) -> Select) -> Self {
        self.select = f(self.select);
        self
    }
}

fn trace_select(select: &Select, dialect: Dialect) {
    let (sql, params) = select.to_sql(dialect);
    tracing::trace!(sql = %sql, params = params.len(), "query");
}

#[allow(clippy::result_large_err)]
fn entity_rows<M: Model>(rows: &[Row]) -> Result<Vec<M>> {
    rows.iter()
        .map(|row| {
            let entity = row.subset_by_prefix(M::TABLE_NAME).ok_or_else(|| {
                Error::Custom(format!("result row has no columns for '{}'", M::TABLE_NAME))
            })?;
            hydrate::<M>(&entity)
        })
        .collect()
}

#[allow(clippy::result_large_err)]
fn count_from(rows: &[Row]) -> Result<u64> {
    match rows.first() {
        Some(row) => Ok(u64::try_from(row.get_named::<i64>(COUNT_ALIAS)?).unwrap_or(0)),
        None => Ok(0),
    }
}

/// A soft-delete aware query over model `M`.
///
/// # Example
///
/// ```ignore
/// let live = query!(User)
///     .filter(Expr::qualified("user", "name").like("jean%"))
///     .all(&cx, &conn)
///     .await;
/// ```
pub struct Query<M: Model> {
    inner: Restricted,
    eager: EagerLoader<M>,
    mappers: Option<Mappers>,
}

impl<M: Model> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            eager: self.eager.clone(),
            mappers: self.mappers.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &M::TABLE_NAME)
            .field("include_deleted", &self.inner.include_deleted)
            .field("select", &self.inner.select)
            .field("includes", &self.eager.includes())
            .finish()
    }
}

impl<M: Model> Default for Query<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Query<M> {
    /// Query live rows of `M`.
    pub fn new() -> Self {
        Self::restricted(false)
    }

    /// Query all rows of `M`, deleted ones included.
    pub fn including_deleted() -> Self {
        Self::restricted(true)
    }

    fn restricted(include_deleted: bool) -> Self {
        Self {
            inner: Restricted::new(vec![Root::entity::<M>()], include_deleted),
            eager: EagerLoader::new(),
            mappers: None,
        }
    }

    /// Add a raw table as another root (cross joined), restricted like the
    /// entity root.
    #[must_use]
    pub fn add_root(mut self, table: Table) -> Self {
        self.inner.push_root(Root::Table(table));
        self
    }

    /// A fresh query over the same roots that includes deleted rows.
    ///
    /// Filters, ordering and includes of this query are not carried over.
    #[must_use]
    pub fn with_deleted(&self) -> Self {
        Self {
            inner: self.inner.with_deleted(),
            eager: EagerLoader::new(),
            mappers: self.mappers.clone(),
        }
    }

    /// Add a WHERE condition (ANDed with the existing ones).
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.inner = self.inner.map_select(|s| s.filter(expr));
        self
    }

    /// Add a JOIN clause.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.inner = self.inner.map_select(|s| s.join(join));
        self
    }

    /// Add ORDER BY clause.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.inner = self.inner.map_select(|s| s.order_by(order));
        self
    }

    /// Set LIMIT.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.inner = self.inner.map_select(|s| s.limit(n));
        self
    }

    /// Set OFFSET.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.inner = self.inner.map_select(|s| s.offset(n));
        self
    }

    /// Set DISTINCT.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.inner = self.inner.map_select(Select::distinct);
        self
    }

    /// Configure eager loading.
    #[must_use]
    pub fn eager(mut self, loader: EagerLoader<M>) -> Self {
        self.eager = loader;
        self
    }

    /// Eager load one more relationship.
    #[must_use]
    pub fn include(mut self, relationship: &'static str) -> Self {
        self.eager = self.eager.include(relationship);
        self
    }

    /// Use these mappers for relationship loading instead of the global ones.
    #[must_use]
    pub fn with_mappers(mut self, mappers: Mappers) -> Self {
        self.mappers = Some(mappers);
        self
    }

    pub fn include_deleted(&self) -> bool {
        self.inner.include_deleted
    }

    /// The `deleted_at` columns this query was restricted on, one per root.
    pub fn soft_delete_columns(&self) -> &[Column] {
        &self.inner.soft_delete_columns
    }

    pub fn roots(&self) -> &[Root] {
        &self.inner.roots
    }

    pub fn select(&self) -> &Select {
        &self.inner.select
    }

    /// Build the SQL query and parameters (PostgreSQL dialect).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.inner.select.to_sql(Dialect::Postgres)
    }

    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        self.inner.select.to_sql(dialect)
    }

    #[allow(clippy::result_large_err)]
    fn resolved_mappers(&self) -> Result<Mappers> {
        self.mappers
            .clone()
            .or_else(|| MapperRegistry::global().configured())
            .ok_or_else(|| {
                Error::mapping(
                    MappingErrorKind::NotConfigured,
                    format!(
                        "eager loading '{}' requires configured mappers",
                        M::TABLE_NAME
                    ),
                )
            })
    }

    /// The SELECT with one outer join per included relationship.
    #[allow(clippy::result_large_err)]
    pub fn eager_select(&self) -> Result<Select> {
        self.build_eager().map(|(select, _)| select)
    }

    #[allow(clippy::result_large_err)]
    fn build_eager(&self) -> Result<(Select, Vec<IncludeSpec>)> {
        let mappers = self.resolved_mappers()?;
        let mut select = self.inner.select.clone();
        let mut in_scope: Vec<String> = self
            .inner
            .roots
            .iter()
            .map(|r| r.table().name().to_string())
            .collect();
        for join in select.joins() {
            in_scope.extend(join.tables().into_iter().map(str::to_string));
        }

        let mut specs = Vec::with_capacity(self.eager.includes().len());
        for name in self.eager.includes() {
            let prop = mappers.relationship(M::TABLE_NAME, name)?;
            let join = prop.eager_join()?;
            for table in join.tables() {
                if in_scope.iter().any(|t| t == table) {
                    return Err(Error::mapping(
                        MappingErrorKind::UnsupportedJoin,
                        format!("including '{name}' would join '{table}' twice"),
                    ));
                }
                in_scope.push(table.to_string());
            }
            select = select.join(join);
            select.project_table(&prop.target);
            specs.push(IncludeSpec {
                name: (*name).to_string(),
                table: prop.target.name().to_string(),
                primary_key: prop
                    .target
                    .primary_key()
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
            });
        }
        Ok((select, specs))
    }

    /// Execute the query and return all matching rows as models.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn all<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<M>, Error> {
        trace_select(&self.inner.select, conn.dialect());
        conn.query(cx, &self.inner.select)
            .await
            .and_then(|rows| match entity_rows::<M>(&rows) {
                Ok(models) => Outcome::Ok(models),
                Err(e) => Outcome::Err(e),
            })
    }

    /// Execute the query and return the first matching row.
    pub async fn first<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Option<M>, Error> {
        let select = self.inner.select.clone().limit(1);
        trace_select(&select, conn.dialect());
        conn.query(cx, &select)
            .await
            .and_then(|rows| match entity_rows::<M>(&rows) {
                Ok(models) => Outcome::Ok(models.into_iter().next()),
                Err(e) => Outcome::Err(e),
            })
    }

    /// Execute the query and return exactly one row.
    ///
    /// A soft-deleted row counts as absent: `Error::NoResultFound`.
    pub async fn one<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<M, Error> {
        match self.all(cx, conn).await {
            Outcome::Ok(mut models) => match models.len() {
                0 => Outcome::Err(Error::NoResultFound),
                1 => match models.pop() {
                    Some(model) => Outcome::Ok(model),
                    None => Outcome::Err(Error::NoResultFound),
                },
                n => Outcome::Err(Error::MultipleResultsFound(n)),
            },
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Execute the query and return the count of matching rows.
    pub async fn count<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let select = self.inner.select.clone().count();
        trace_select(&select, conn.dialect());
        conn.query(cx, &select)
            .await
            .and_then(|rows| match count_from(&rows) {
                Ok(n) => Outcome::Ok(n),
                Err(e) => Outcome::Err(e),
            })
    }

    /// Check if any rows match the query.
    pub async fn exists<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<bool, Error> {
        self.count(cx, conn).await.map(|n| n > 0)
    }

    /// Point lookup by a single-column primary key.
    pub async fn get<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        key: impl Into<Value>,
    ) -> Outcome<Option<M>, Error> {
        self.get_by_key(cx, conn, &[key.into()]).await
    }

    /// Point lookup by primary key.
    ///
    /// The row is always fetched through the unrestricted path and then
    /// checked here: unless this query includes deleted rows, a row whose
    /// `deleted_at` is set is reported as not found.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn get_by_key<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        key: &[Value],
    ) -> Outcome<Option<M>, Error> {
        if key.len() != M::PRIMARY_KEY.len() || key.is_empty() {
            return Outcome::Err(Error::Custom(format!(
                "'{}' has a {}-column primary key, got {} value(s)",
                M::TABLE_NAME,
                M::PRIMARY_KEY.len(),
                key.len()
            )));
        }
        let predicate = Expr::all(
            M::PRIMARY_KEY
                .iter()
                .zip(key)
                .map(|(column, value)| Expr::qualified(M::TABLE_NAME, *column).eq(value.clone())),
        );
        let mut lookup = self.with_deleted();
        if let Some(predicate) = predicate {
            lookup = lookup.filter(predicate);
        }

        match lookup.first(cx, conn).await {
            Outcome::Ok(Some(obj)) => {
                if self.inner.include_deleted || obj.deleted_at().is_none() {
                    Outcome::Ok(Some(obj))
                } else {
                    tracing::debug!(table = M::TABLE_NAME, "point lookup hit a deleted row");
                    Outcome::Ok(None)
                }
            }
            Outcome::Ok(None) => Outcome::Ok(None),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Execute with the included relationships joined in.
    ///
    /// Without includes this is `all` with nothing loaded alongside.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn all_eager<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<Vec<Loaded<M>>, Error> {
        if !self.eager.has_includes() {
            return self
                .all(cx, conn)
                .await
                .map(|models| models.into_iter().map(Loaded::bare).collect());
        }
        let (select, specs) = match self.build_eager() {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        tracing::debug!(
            table = M::TABLE_NAME,
            includes = specs.len(),
            "executing eager loading query"
        );
        trace_select(&select, conn.dialect());
        conn.query(cx, &select)
            .await
            .and_then(|rows| match group_rows::<M>(&rows, &specs) {
                Ok(loaded) => Outcome::Ok(loaded),
                Err(e) => Outcome::Err(e),
            })
    }
}

/// A soft-delete aware query over raw tables.
///
/// Rows come back with columns aliased `<table>__<column>`; split them with
/// `Row::subset_by_prefix`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    inner: Restricted,
}

impl TableQuery {
    /// Query live rows of `tables`.
    pub fn new(tables: &[Table]) -> Self {
        Self::restricted(tables, false)
    }

    /// Query all rows of `tables`.
    pub fn including_deleted(tables: &[Table]) -> Self {
        Self::restricted(tables, true)
    }

    fn restricted(tables: &[Table], include_deleted: bool) -> Self {
        let roots = tables.iter().cloned().map(Root::Table).collect();
        Self {
            inner: Restricted::new(roots, include_deleted),
        }
    }

    /// A fresh query over the same tables that includes deleted rows.
    #[must_use]
    pub fn with_deleted(&self) -> Self {
        Self {
            inner: self.inner.with_deleted(),
        }
    }

    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.inner = self.inner.map_select(|s| s.filter(expr));
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.inner = self.inner.map_select(|s| s.join(join));
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.inner = self.inner.map_select(|s| s.order_by(order));
        self
    }

    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.inner = self.inner.map_select(|s| s.limit(n));
        self
    }

    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.inner = self.inner.map_select(|s| s.offset(n));
        self
    }

    pub fn include_deleted(&self) -> bool {
        self.inner.include_deleted
    }

    pub fn soft_delete_columns(&self) -> &[Column] {
        &self.inner.soft_delete_columns
    }

    pub fn select(&self) -> &Select {
        &self.inner.select
    }

    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        self.inner.select.to_sql(dialect)
    }

    /// Execute and return the aliased rows.
    pub async fn all<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        trace_select(&self.inner.select, conn.dialect());
        conn.query(cx, &self.inner.select).await
    }

    pub async fn count<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let select = self.inner.select.clone().count();
        conn.query(cx, &select)
            .await
            .and_then(|rows| match count_from(&rows) {
                Ok(n) => Outcome::Ok(n),
                Err(e) => Outcome::Err(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Statement;
    use asupersync::runtime::RuntimeBuilder;
    use paranoid_core::{FieldInfo, SqlType, column_alias};
    use std::future::Future;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct User {
        id: Option<i64>,
        name: String,
        deleted_at: Option<i64>,
    }

    impl Model for User {
        const TABLE_NAME: &'static str = "user";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];
        const SOFT_DELETE: bool = true;

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
                FieldInfo::new("name", "name", SqlType::Text),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into()), ("name", self.name.clone().into())]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                name: row.get_named("name")?,
                deleted_at: None,
            })
        }

        fn primary_key_value(&self) -> Vec<Value> {
            vec![self.id.into()]
        }

        fn is_new(&self) -> bool {
            self.id.is_none()
        }

        fn deleted_at(&self) -> Option<i64> {
            self.deleted_at
        }

        fn set_deleted_at(&mut self, value: Option<i64>) {
            self.deleted_at = value;
        }
    }

    #[derive(Debug, Clone)]
    struct Tag {
        id: i64,
    }

    impl Model for Tag {
        const TABLE_NAME: &'static str = "tag";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] =
                &[FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true)];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into())]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
            })
        }

        fn primary_key_value(&self) -> Vec<Value> {
            vec![self.id.into()]
        }

        fn is_new(&self) -> bool {
            false
        }
    }

    /// Returns canned rows and records the statements it was asked to run.
    struct CannedConnection {
        rows: Vec<Row>,
        seen: Mutex<Vec<Select>>,
    }

    impl CannedConnection {
        fn new(rows: Vec<Row>) -> Self {
            Self {
                rows,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Connection for CannedConnection {
        fn query(
            &self,
            _cx: &Cx,
            select: &Select,
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            self.seen.lock().unwrap().push(select.clone());
            let rows = self.rows.clone();
            async move { Outcome::Ok(rows) }
        }

        fn execute(
            &self,
            _cx: &Cx,
            _statement: &Statement,
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            async { Outcome::Ok(0) }
        }

        fn insert(
            &self,
            _cx: &Cx,
            _statement: &Statement,
        ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
            async { Outcome::Ok(None) }
        }

        fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }

        fn commit(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }

        fn rollback(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
    }

    fn user_row(id: i64, name: &str, deleted_at: Option<i64>) -> Row {
        Row::new(
            vec![
                column_alias("user", "id"),
                column_alias("user", "name"),
                column_alias("user", "deleted_at"),
            ],
            vec![
                Value::BigInt(id),
                Value::Text(name.into()),
                deleted_at.map_or(Value::Null, Value::TimestampTz),
            ],
        )
    }

    #[test]
    fn test_new_restricts_root() {
        let query = Query::<User>::new().filter(Expr::qualified("user", "id").eq(1_i64));
        let (sql, params) = query.build();
        assert!(sql.ends_with(
            "WHERE \"user\".\"deleted_at\" IS NULL AND \"user\".\"id\" = $1"
        ));
        assert_eq!(params, vec![Value::BigInt(1)]);
        assert_eq!(query.soft_delete_columns().len(), 1);
        assert_eq!(query.soft_delete_columns()[0].table, "user");
    }

    #[test]
    fn test_or_filter_stays_under_restriction() {
        let query = Query::<User>::new().filter(
            Expr::qualified("user", "id")
                .eq(1_i64)
                .or(Expr::qualified("user", "name").eq("deleted")),
        );
        let (sql, _) = query.build();
        assert!(sql.ends_with(
            "WHERE \"user\".\"deleted_at\" IS NULL AND (\"user\".\"id\" = $1 OR \
             \"user\".\"name\" = $2)"
        ));
    }

    #[test]
    fn test_including_deleted_and_with_deleted() {
        let query = Query::<User>::including_deleted();
        assert!(query.include_deleted());
        assert!(query.soft_delete_columns().is_empty());
        assert!(!query.build().0.contains("WHERE"));

        let filtered = Query::<User>::new().filter(Expr::qualified("user", "name").eq("x"));
        let unrestricted = filtered.with_deleted();
        assert!(unrestricted.include_deleted());
        assert!(unrestricted.select().filter_expr().is_none());
    }

    #[test]
    fn test_plain_model_is_not_restricted() {
        let query = Query::<Tag>::new();
        assert!(query.soft_delete_columns().is_empty());
        assert!(query.select().filter_expr().is_none());
    }

    #[test]
    fn test_add_root_restricts_raw_table() {
        let archive = Table::new("archive")
            .with_column(paranoid_core::Column::new("id", SqlType::BigInt))
            .with_column(paranoid_core::Column::deleted_at());
        let query = Query::<Tag>::new().add_root(archive);
        let (sql, _) = query.build();
        assert!(sql.contains("FROM \"tag\", \"archive\""));
        assert!(sql.ends_with("WHERE \"archive\".\"deleted_at\" IS NULL"));
    }

    #[test]
    fn test_table_query() {
        let table = Table::new("audit")
            .with_column(paranoid_core::Column::new("id", SqlType::BigInt))
            .with_column(paranoid_core::Column::deleted_at());
        let query = TableQuery::new(std::slice::from_ref(&table));
        assert_eq!(query.soft_delete_columns().len(), 1);
        assert!(query.to_sql(Dialect::Sqlite).0.contains("\"audit\".\"deleted_at\" IS NULL"));
        assert!(query.with_deleted().soft_delete_columns().is_empty());
    }

    #[test]
    fn test_get_hides_deleted_row() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let conn = CannedConnection::new(vec![user_row(2, "deleted", Some(100))]);

            let hidden = Query::<User>::new().get(&cx, &conn, 2_i64).await;
            assert!(matches!(hidden, Outcome::Ok(None)));

            let found = Query::<User>::new().with_deleted().get(&cx, &conn, 2_i64).await;
            match found {
                Outcome::Ok(Some(user)) => {
                    assert_eq!(user.name, "deleted");
                    assert_eq!(user.deleted_at, Some(100));
                }
                other => panic!("unexpected outcome: {other:?}"),
            }

            // The lookup itself never carries the restriction.
            let seen = conn.seen.lock().unwrap();
            let (sql, _) = seen[0].build();
            assert!(!sql.contains("IS NULL"));
            assert!(sql.contains("\"user\".\"id\" = $1"));
        });
    }

    #[test]
    fn test_one_errors() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let empty = CannedConnection::new(Vec::new());
            let outcome = Query::<User>::new().one(&cx, &empty).await;
            assert!(matches!(outcome, Outcome::Err(Error::NoResultFound)));

            let two = CannedConnection::new(vec![user_row(1, "a", None), user_row(3, "b", None)]);
            let outcome = Query::<User>::new().one(&cx, &two).await;
            assert!(matches!(outcome, Outcome::Err(Error::MultipleResultsFound(2))));
        });
    }

    #[test]
    fn test_eager_include_of_unregistered_model() {
        let query = Query::<User>::new()
            .with_mappers(MapperRegistry::new().configure().unwrap())
            .include("groups");
        let err = query.eager_select().unwrap_err();
        assert_eq!(err.mapping_kind(), Some(MappingErrorKind::UnknownTable));
    }
}
