//! rowgraph: typed object graphs over relational tables, in one round trip.
//!
//! A declared type (with its relations, embedded value objects and
//! inheritance hierarchy) is compiled into a single SELECT that joins every
//! table the graph touches. The flat rows that come back are folded into a
//! deduplicated object graph.
//!
//! # Role In The Architecture
//!
//! This is the facade crate. It re-exports the public surface of the
//! workspace and adds the [`Query`] driver:
//!
//! - `rowgraph-core`: metadata, values, dialects, errors.
//! - `rowgraph-query`: join-graph builder and SQL renderer.
//! - `rowgraph-materialize`: identity cache and object graph.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rowgraph::prelude::*;
//!
//! let catalog = Catalog::new().with_source(
//!     DynamicSource::new()
//!         .with(
//!             TypeDef::new("Team")
//!                 .table("team")
//!                 .field(FieldDef::value("id", ValueType::BigInt).id())
//!                 .field(FieldDef::named("heroes", "Hero").list()),
//!         )
//!         .with(
//!             TypeDef::new("Hero")
//!                 .table("hero")
//!                 .field(FieldDef::value("id", ValueType::BigInt).id())
//!                 .field(FieldDef::value("name", ValueType::Text)),
//!         ),
//! );
//! let context = Context::new(Arc::new(catalog));
//! let compiled = context.query("Team").order_by("{team.id}").compile().unwrap();
//! assert!(compiled.sql().contains("LEFT JOIN \"hero\" AS \"heroes\""));
//! ```

pub mod connection;
pub mod query;

pub use connection::{Connection, RowStream};
pub use query::{CompiledQuery, Context, Query};

pub use rowgraph_core::{
    Cardinality, Catalog, CoercionError, ColumnIndex, Config, ConfigError, ConfigErrorKind,
    Dialect, DynamicSource, Entity, Error, FieldAttrs, FieldDef, FieldInfo, FieldType,
    InheritanceStrategy, LinkTable, MetadataSource, ParseError, ParseErrorKind,
    PlaceholderStyle, Result, Row, SchemaQualification, SourceError, StaticSource, TableName,
    TypeDef, TypeDescriptor, TypeInfo, Value, ValueType,
};
pub use rowgraph_materialize::{Materializer, Object, ObjectGraph, ObjectId, RootStream, Slot};
pub use rowgraph_query::{Fragments, JoinGraph, SqlExpression, Statement};

/// Everything needed to declare types and run queries.
pub mod prelude {
    pub use crate::{
        Catalog, CompiledQuery, Config, Connection, Context, Dialect, DynamicSource, Entity,
        Error, FieldAttrs, FieldDef, FieldInfo, FieldType, LinkTable, Object, ObjectGraph,
        Query, Result, Row, RowStream, Slot, SqlExpression, StaticSource, TableName, TypeDef,
        TypeInfo, Value, ValueType,
    };
}
