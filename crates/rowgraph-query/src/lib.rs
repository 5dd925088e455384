//! Join-graph compilation and SQL rendering for rowgraph.
//!
//! `rowgraph-query` turns a declared type into one SELECT statement that
//! fetches the whole object graph in a single round trip.
//!
//! # Role In The Architecture
//!
//! - **Inheritance**: `inheritance::resolve` maps a type onto its tables under
//!   the NONE, VERTICAL or DISCRIMINATED strategy.
//! - **Join graph**: `join_graph::build` walks relations and embedded objects
//!   and produces a [`JoinGraph`]: aliases addressed by dotted paths, the
//!   labelled select list and the materialization plan.
//! - **Rendering**: `render::render` assembles the statement, resolves
//!   `{path}` markers and rewrites parameters for the target [`Dialect`].
//!
//! # Who Uses This Crate
//!
//! - `rowgraph-materialize` consumes the [`JoinGraph`] plan to rebuild objects.
//! - The `rowgraph` facade drives compile, render and execute.
//!
//! [`Dialect`]: rowgraph_core::Dialect

pub mod alias;
pub mod expr;
pub mod inheritance;
pub mod join_graph;
pub mod markers;
pub mod params;
pub mod render;

pub use alias::{
    Alias, AliasRole, ColumnMapping, ColumnRef, DiscriminatorMapping, EmbeddedMapping,
    EntityMapping, JoinCondition, JoinGraph, JoinType, LevelMapping, Members, RelationKind,
    RelationMapping, Restriction, SelectExpr, SqlField, SqlJoin,
};
pub use expr::SqlExpression;
pub use inheritance::{DiscriminatorInfo, LevelRole, TableBinding, TableMapping};
pub use join_graph::{JoinGraphBuilder, build, build_entity};
pub use params::{ParamMarker, ScanResult, scan};
pub use render::{Fragments, Statement, bind_parameters, render};
