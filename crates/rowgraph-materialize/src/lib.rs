//! Object-graph materialization for rowgraph.
//!
//! `rowgraph-materialize` rebuilds the declared object graph from the flat rows
//! a compiled statement returns.
//!
//! # Role In The Architecture
//!
//! - **Identity cache**: one instance per (alias path, normalized key) within a
//!   single materialization, so fan-out rows collapse into one object.
//! - **Subtype selection**: vertical hierarchies pick the deepest level with a
//!   non-null key; discriminated hierarchies match the stored name.
//! - **Coercion**: row values are converted to the declared field types, with
//!   `chrono` handling temporal conversions.
//! - **Output**: an arena [`ObjectGraph`] that renders to JSON and deserializes
//!   into caller types through serde.

pub mod coerce;
pub mod identity;
pub mod materializer;
pub mod object;

pub use identity::IdentityKey;
pub use materializer::{Materializer, RootStream};
pub use object::{Object, ObjectGraph, ObjectId, Slot};
