//! Composition point: registered models, configured mappers and a connection.

use paranoid_core::{Cx, Error, Model, Outcome, Result, Table};
use paranoid_query::{Connection, MapperRegistry, Mappers, Query, TableQuery};
use paranoid_session::{Session, SessionConfig};

/// Builder collecting the models and association tables of an application.
///
/// Registration errors are kept and reported by `build`, so the builder
/// chains without intermediate `?`.
#[derive(Debug, Default)]
pub struct ParanoidBuilder {
    registry: MapperRegistry,
    session_config: SessionConfig,
    error: Option<Error>,
}

impl ParanoidBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(mut self, result: Result<()>) -> Self {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Register model `M`.
    pub fn model<M: Model>(self) -> Self {
        let result = self.registry.register::<M>();
        self.record(result)
    }

    /// Register a raw table, e.g. an association table.
    pub fn table(self, table: Table) -> Self {
        let result = self.registry.table(table);
        self.record(result)
    }

    /// Configuration for sessions handed out by `Paranoid::session`.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Configure the mappers and bind them to `connection`.
    ///
    /// This is where relationship joins are rewritten. Fails with the first
    /// registration error, or when a relationship has an unsupported join.
    #[allow(clippy::result_large_err)]
    pub fn build<C: Connection>(self, connection: C) -> Result<Paranoid<C>> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mappers = self.registry.configure()?;
        Ok(Paranoid {
            connection,
            mappers,
            session_config: self.session_config,
        })
    }
}

/// Configured mappers bound to a connection.
#[derive(Debug)]
pub struct Paranoid<C> {
    connection: C,
    mappers: Mappers,
    session_config: SessionConfig,
}

impl Paranoid<()> {
    /// Start registering models. The connection type is fixed by `build`.
    pub fn builder() -> ParanoidBuilder {
        ParanoidBuilder::new()
    }
}

impl<C: Connection> Paranoid<C> {
    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn mappers(&self) -> &Mappers {
        &self.mappers
    }

    /// Live rows of `M`, with relationship includes resolved by these mappers.
    pub fn query<M: Model>(&self) -> Query<M> {
        Query::<M>::new().with_mappers(self.mappers.clone())
    }

    /// Live rows of every soft-delete table in `tables`.
    pub fn table_query(&self, tables: &[Table]) -> TableQuery {
        TableQuery::new(tables)
    }

    /// A registered table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.mappers.table(name)
    }

    /// Create every registered table, in foreign key order.
    pub async fn create_all(&self, cx: &Cx) -> Outcome<(), Error> {
        paranoid_schema::create_all(cx, &self.connection, self.mappers.tables()).await
    }

    /// Drop every registered table, dependents first.
    pub async fn drop_all(&self, cx: &Cx) -> Outcome<(), Error> {
        paranoid_schema::drop_all(cx, &self.connection, self.mappers.tables()).await
    }
}

impl<C: Connection + Clone> Paranoid<C> {
    /// A new session on a clone of the connection.
    pub fn session(&self) -> Session<C> {
        Session::with_config(self.connection.clone(), self.session_config)
            .with_mappers(self.mappers.clone())
    }
}
