//! Core types and metadata for rowgraph.
//!
//! `rowgraph-core` is the **contract layer** of the workspace. It defines the
//! data and metadata types every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Metadata model**: `Catalog` turns definitions from any `MetadataSource`
//!   (static `TypeInfo` or runtime `TypeDef`) into shared, immutable
//!   `TypeDescriptor`s.
//! - **Data model**: `Value` and `Row` are what row sources produce and what
//!   statements bind.
//! - **Policy**: `Dialect` and `Config` are passed explicitly to every stage.
//!
//! # Who Uses This Crate
//!
//! - `rowgraph-query` reads descriptors to build join graphs and render SQL.
//! - `rowgraph-materialize` reads descriptors and rows to rebuild objects.
//! - The `rowgraph` facade re-exports the public surface.

pub mod config;
pub mod dialect;
pub mod dynamic;
pub mod entity;
pub mod error;
pub mod field;
pub mod metadata;
pub mod row;
pub mod value;

pub use config::Config;
pub use dialect::{Dialect, PlaceholderStyle, SchemaQualification};
pub use dynamic::{DynamicSource, FieldDef, TypeDef};
pub use entity::{Entity, StaticSource, TypeInfo};
pub use error::{
    CoercionError, ConfigError, ConfigErrorKind, Error, ParseError, ParseErrorKind, Result,
    SourceError,
};
pub use field::{
    Cardinality, FieldAttrs, FieldInfo, FieldType, InheritanceStrategy, LinkTable, TableName,
    ValueType,
};
pub use metadata::{
    Catalog, FieldClass, FieldDescriptor, MetadataSource, SourceKind, TypeDescriptor, TypeFlags,
};
pub use row::{ColumnIndex, Row};
pub use value::Value;
