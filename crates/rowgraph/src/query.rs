//! Compile, execute and materialize in one call chain.
//!
//! ```
//! use std::sync::Arc;
//! use rowgraph::prelude::*;
//!
//! let catalog = Catalog::new().with_source(
//!     DynamicSource::new().with(
//!         TypeDef::new("Hero")
//!             .table("hero")
//!             .field(FieldDef::value("id", ValueType::BigInt).id())
//!             .field(FieldDef::value("name", ValueType::Text)),
//!     ),
//! );
//! let context = Context::new(Arc::new(catalog));
//! let statement = context
//!     .query("Hero")
//!     .filter(SqlExpression::new("{hero.name} = ?").bind("Deadpond"))
//!     .to_statement()
//!     .unwrap();
//! assert!(statement.sql.ends_with("WHERE \"hero\".\"name\" = $1"));
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;

use rowgraph_core::{Catalog, Config, Entity, Result, Value};
use rowgraph_materialize::{Materializer, ObjectGraph, RootStream};
use rowgraph_query::{Fragments, JoinGraph, SqlExpression, Statement, join_graph, render};

use crate::connection::{Connection, RowStream};

/// Metadata and configuration shared by the queries of an application.
#[derive(Debug, Clone)]
pub struct Context {
    catalog: Arc<Catalog>,
    config: Config,
}

impl Context {
    /// Create a context with the default configuration.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_config(catalog, Config::default())
    }

    /// Create a context with an explicit configuration.
    pub fn with_config(catalog: Arc<Catalog>, config: Config) -> Self {
        Self { catalog, config }
    }

    /// The metadata catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a query for a type known to the catalog.
    pub fn query(&self, type_name: impl Into<String>) -> Query<'_> {
        Query {
            context: self,
            type_name: type_name.into(),
            fragments: Fragments::new(),
        }
    }

    /// Start a query for a static entity.
    pub fn query_entity<E: Entity>(&self) -> Query<'_> {
        self.query(E::type_name())
    }
}

/// A query being assembled.
#[derive(Debug, Clone)]
pub struct Query<'c> {
    context: &'c Context,
    type_name: String,
    fragments: Fragments,
}

impl<'c> Query<'c> {
    /// Add a WHERE condition. Conditions are ANDed.
    pub fn filter(mut self, condition: impl Into<SqlExpression>) -> Self {
        self.fragments = self.fragments.filter(condition);
        self
    }

    /// Add a GROUP BY term.
    pub fn group_by(mut self, term: impl Into<SqlExpression>) -> Self {
        self.fragments = self.fragments.group_by(term);
        self
    }

    /// Add an ORDER BY term.
    pub fn order_by(mut self, term: impl Into<SqlExpression>) -> Self {
        self.fragments = self.fragments.order_by(term);
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, rows: u64) -> Self {
        self.fragments = self.fragments.limit(rows);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, rows: u64) -> Self {
        self.fragments = self.fragments.offset(rows);
        self
    }

    /// Bind a `:name` parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fragments = self.fragments.bind(name, value);
        self
    }

    /// Build the join graph and render the statement.
    #[tracing::instrument(level = "debug", skip(self), fields(type_name = %self.type_name))]
    pub fn compile(&self) -> Result<CompiledQuery> {
        let catalog = &self.context.catalog;
        let graph = join_graph::build(catalog, &self.type_name)?;
        let statement = render::render(&graph, &self.fragments, &self.context.config.dialect)?;
        Ok(CompiledQuery {
            catalog: Arc::clone(catalog),
            graph,
            statement,
            fetch_size: self.context.config.fetch_size,
        })
    }

    /// The statement this query would run.
    pub fn to_statement(&self) -> Result<Statement> {
        self.compile().map(|c| c.statement)
    }

    /// Run the query and materialize every row.
    pub fn execute<C: Connection>(&self, connection: &mut C) -> Result<ObjectGraph> {
        self.compile()?.execute(connection)
    }

    /// Run the query and deserialize the roots into `T`.
    pub fn execute_as<T, C>(&self, connection: &mut C) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        C: Connection,
    {
        self.compile()?.execute_as(connection)
    }

    /// Run the query and hand each root to `f` as soon as it is complete.
    ///
    /// Add an ORDER BY on the root key: roots are split where the key
    /// changes.
    pub fn stream<C, F>(&self, connection: &mut C, mut f: F) -> Result<usize>
    where
        C: Connection,
        F: FnMut(ObjectGraph) -> Result<()>,
    {
        let compiled = self.compile()?;
        let mut count = 0;
        for graph in compiled.stream(connection)? {
            f(graph?)?;
            count += 1;
        }
        Ok(count)
    }
}

/// A compiled query: its join graph and rendered statement.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    catalog: Arc<Catalog>,
    graph: JoinGraph,
    statement: Statement,
    fetch_size: Option<usize>,
}

impl CompiledQuery {
    /// The join graph.
    pub fn graph(&self) -> &JoinGraph {
        &self.graph
    }

    /// The rendered statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.statement.params
    }

    fn rows<'a, C: Connection>(&self, connection: &'a mut C) -> Result<RowStream<'a>> {
        tracing::debug!(
            sql = %self.statement.sql,
            params = self.statement.params.len(),
            fetch_size = ?self.fetch_size,
            "Executing query"
        );
        connection.query(&self.statement.sql, &self.statement.params, self.fetch_size)
    }

    /// Run the statement and materialize every row.
    pub fn execute<C: Connection>(&self, connection: &mut C) -> Result<ObjectGraph> {
        let rows = self.rows(connection)?;
        Materializer::new(&self.graph, &self.catalog).materialize(rows)
    }

    /// Run the statement and deserialize the roots into `T`.
    pub fn execute_as<T, C>(&self, connection: &mut C) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        C: Connection,
    {
        self.execute(connection)?.roots_as()
    }

    /// Run the statement and materialize lazily, one root per item.
    pub fn stream<'a, C: Connection>(
        &'a self,
        connection: &'a mut C,
    ) -> Result<RootStream<'a, RowStream<'a>>> {
        let rows = self.rows(connection)?;
        Ok(Materializer::new(&self.graph, &self.catalog).stream(rows))
    }
}
