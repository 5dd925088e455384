//! Row-to-object materialization.
//!
//! Rows are processed one at a time. For each row the entity plans of the
//! join graph are visited root first, depth first:
//!
//! 1. Read the entity's key columns; if all are NULL the entity (and every
//!    entity below it) is absent from this row.
//! 2. Look the key up in the identity cache; create the instance on a miss,
//!    choosing the concrete subtype from the row.
//! 3. Populate scalar and embedded fields when the instance is created.
//! 4. Link the instance into its parent, at most once per parent.
//!
//! After the last row, fixed-size collections are finalized.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rowgraph_core::{
    Cardinality, Catalog, CoercionError, Error, FieldClass, FieldDescriptor, InheritanceStrategy,
    Result, Row, TypeDescriptor, Value,
};
use rowgraph_query::{EntityMapping, JoinGraph, LevelRole, Members, RelationKind};

use crate::coerce::{self, Rejected};
use crate::identity::IdentityKey;
use crate::object::{Object, ObjectGraph, ObjectId, Slot};

// ============================================================================
// Materializer
// ============================================================================

/// Rebuilds object graphs from the rows of a compiled join graph.
#[derive(Debug, Clone, Copy)]
pub struct Materializer<'g> {
    plan: &'g JoinGraph,
    catalog: &'g Catalog,
}

impl<'g> Materializer<'g> {
    /// Create a materializer for rows produced by `plan`'s statement.
    ///
    /// `catalog` resolves enum constants.
    pub fn new(plan: &'g JoinGraph, catalog: &'g Catalog) -> Self {
        Self { plan, catalog }
    }

    /// Materialize every row into one graph.
    ///
    /// Root order is the order in which each root key first appears.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn materialize<I>(&self, rows: I) -> Result<ObjectGraph>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        let mut pass = Pass::new(self.plan, self.catalog);
        for row in rows {
            pass.row(&row?)?;
        }
        let rows = pass.rows;
        let graph = pass.finish();
        tracing::debug!(
            rows,
            roots = graph.len(),
            objects = graph.object_count(),
            "Materialized result"
        );
        Ok(graph)
    }

    /// Materialize rows that are already in memory.
    pub fn materialize_rows(&self, rows: &[Row]) -> Result<ObjectGraph> {
        self.materialize(rows.iter().cloned().map(Ok))
    }

    /// Materialize lazily, one root at a time.
    ///
    /// A root is emitted as soon as a row with a different root key appears,
    /// and the identity cache is reset for the next root. Rows must therefore
    /// arrive grouped by root key (ORDER BY the root's primary key).
    pub fn stream<I>(&self, rows: I) -> RootStream<'g, I::IntoIter>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        RootStream {
            plan: self.plan,
            catalog: self.catalog,
            rows: rows.into_iter(),
            pass: Pass::new(self.plan, self.catalog),
            current: None,
            done: false,
        }
    }
}

/// Iterator returned by [`Materializer::stream`]. Each item is a graph with
/// exactly one root.
pub struct RootStream<'g, I> {
    plan: &'g JoinGraph,
    catalog: &'g Catalog,
    rows: I,
    pass: Pass<'g>,
    current: Option<IdentityKey>,
    done: bool,
}

impl<'g, I> RootStream<'g, I> {
    fn take_pass(&mut self) -> ObjectGraph {
        std::mem::replace(&mut self.pass, Pass::new(self.plan, self.catalog)).finish()
    }
}

impl<I> Iterator for RootStream<'_, I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<ObjectGraph>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let plan = self.plan;
        let root = plan.root_entity()?;
        loop {
            let row = match self.rows.next() {
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return self.current.take().map(|_| Ok(self.take_pass()));
                }
            };
            let Some(key) = identity(&row, root) else {
                tracing::trace!(path = %root.path, "Skipping row without a root key");
                continue;
            };
            let new_root = self.current.as_ref().is_some_and(|current| *current != key);
            let finished = new_root.then(|| self.take_pass());
            self.current = Some(key);
            if let Err(e) = self.pass.row(&row) {
                self.done = true;
                return Some(Err(e));
            }
            if let Some(graph) = finished {
                return Some(Ok(graph));
            }
        }
    }
}

// ============================================================================
// Per-execution state
// ============================================================================

/// Identity cache and output of one materialization. Never shared between
/// calls.
struct Pass<'g> {
    plan: &'g JoinGraph,
    catalog: &'g Catalog,
    out: ObjectGraph,
    cache: HashMap<(usize, IdentityKey), ObjectId>,
    /// Concrete type of every arena object, by arena position.
    types: Vec<Arc<TypeDescriptor>>,
    /// `(parent, child entity, child)` links already made.
    linked: HashSet<(ObjectId, usize, ObjectId)>,
    arrays: Vec<(ObjectId, Vec<Vec<String>>)>,
    rows: usize,
}

impl<'g> Pass<'g> {
    fn new(plan: &'g JoinGraph, catalog: &'g Catalog) -> Self {
        Self {
            plan,
            catalog,
            out: ObjectGraph::default(),
            cache: HashMap::new(),
            types: Vec::new(),
            linked: HashSet::new(),
            arrays: Vec::new(),
            rows: 0,
        }
    }

    fn row(&mut self, row: &Row) -> Result<()> {
        self.rows += 1;
        if self.plan.entities.is_empty() {
            return Ok(());
        }
        self.entity(row, 0)?;
        Ok(())
    }

    fn finish(mut self) -> ObjectGraph {
        self.out.finalize(&self.arrays);
        self.out
    }

    fn entity(&mut self, row: &Row, index: usize) -> Result<Option<ObjectId>> {
        let plan = self.plan;
        let mapping = &plan.entities[index];
        let Some(key) = identity(row, mapping) else {
            tracing::trace!(path = %mapping.path, "All key columns NULL; entity absent");
            return Ok(None);
        };

        let cache_key = (index, key);
        let id = if let Some(&id) = self.cache.get(&cache_key) {
            id
        } else {
            let id = self.create(row, mapping)?;
            self.cache.insert(cache_key, id);
            if index == 0 {
                self.out.roots.push(id);
            }
            id
        };

        let ty = Arc::clone(&self.types[id.index()]);
        self.link(row, &mapping.members, id, &ty, &mut Vec::new(), true)?;
        Ok(Some(id))
    }

    fn create(&mut self, row: &Row, mapping: &EntityMapping) -> Result<ObjectId> {
        let ty = select_type(row, mapping);
        let mut object = Object::new(&ty.name, &mapping.path);
        let mut arrays = Vec::new();
        self.populate(
            row,
            &mapping.members,
            &ty,
            &mapping.path,
            &mut object,
            &mut Vec::new(),
            &mut arrays,
            true,
        )?;
        let id = self.out.push(object);
        self.types.push(ty);
        if !arrays.is_empty() {
            self.arrays.push((id, arrays));
        }
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn populate(
        &self,
        row: &Row,
        members: &Members,
        ty: &TypeDescriptor,
        path: &str,
        object: &mut Object,
        chain: &mut Vec<String>,
        arrays: &mut Vec<Vec<String>>,
        check_owner: bool,
    ) -> Result<()> {
        let applies = |field: &FieldDescriptor| !check_owner || ty.is_a(&field.owner);

        for column in members.columns.iter().filter(|c| applies(&c.field)) {
            let raw = row.get_or_null(&column.label).clone();
            let value = self.coerce(&column.field, path, raw)?;
            object.set(column.field.name.clone(), Slot::Value(value));
        }

        for embedded in members.embedded.iter().filter(|e| applies(&e.field)) {
            let mut inner = Object::new(&embedded.target.name, path);
            chain.push(embedded.field.name.clone());
            self.populate(row, &embedded.members, ty, path, &mut inner, chain, arrays, false)?;
            chain.pop();
            let has_data = inner.fields.iter().any(|(_, slot)| match slot {
                Slot::Value(v) => !v.is_null(),
                Slot::Embedded(_) => true,
                _ => false,
            });
            // An all-NULL value object is left unset.
            if has_data {
                object.set(embedded.field.name.clone(), Slot::Embedded(Box::new(inner)));
            }
        }

        for relation in members.relations.iter().filter(|r| applies(&r.field)) {
            if !relation.kind.is_many() {
                continue;
            }
            object.set(relation.field.name.clone(), Slot::List(Vec::new()));
            if relation.field.cardinality == Cardinality::Array {
                let mut at = chain.clone();
                at.push(relation.field.name.clone());
                arrays.push(at);
            }
        }
        Ok(())
    }

    fn coerce(&self, field: &FieldDescriptor, path: &str, raw: Value) -> Result<Value> {
        let target = match (field.class, field.target_type()) {
            (FieldClass::Enum, Some(name)) => Some(self.catalog.describe(name)?),
            _ => None,
        };
        coerce::coerce_field(field, target.as_deref(), raw).map_err(|r| coercion_error(field, path, r))
    }

    fn link(
        &mut self,
        row: &Row,
        members: &'g Members,
        id: ObjectId,
        ty: &TypeDescriptor,
        chain: &mut Vec<(String, String)>,
        check_owner: bool,
    ) -> Result<()> {
        let applies = |field: &FieldDescriptor| !check_owner || ty.is_a(&field.owner);

        for relation in members.relations.iter().filter(|r| applies(&r.field)) {
            let Some(child) = self.entity(row, relation.child)? else {
                continue;
            };
            if !self.linked.insert((id, relation.child, child)) {
                continue;
            }
            let Some(owner) = self.out.object_mut(id).embedded_mut(chain) else {
                continue;
            };
            let name = &relation.field.name;
            match relation.kind {
                RelationKind::ToOne | RelationKind::Embedded => {
                    if owner.get(name).is_none() {
                        owner.set(name.clone(), Slot::Ref(child));
                    }
                }
                RelationKind::ToManyDirect | RelationKind::ToManyLinked => {
                    match owner.get_mut(name) {
                        Some(Slot::List(ids)) => ids.push(child),
                        _ => owner.set(name.clone(), Slot::List(vec![child])),
                    }
                }
            }
        }

        for embedded in members.embedded.iter().filter(|e| applies(&e.field)) {
            chain.push((embedded.field.name.clone(), embedded.target.name.clone()));
            let linked = self.link(row, &embedded.members, id, ty, chain, false);
            chain.pop();
            linked?;
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Identity of an entity in a row: its key columns, or every column it reads
/// when it declares no key.
fn identity(row: &Row, mapping: &EntityMapping) -> Option<IdentityKey> {
    let keys = mapping.key_labels();
    if keys.is_empty() {
        IdentityKey::from_values(
            mapping
                .members
                .all_labels()
                .into_iter()
                .map(|label| row.get_or_null(label)),
        )
    } else {
        IdentityKey::from_values(keys.iter().map(|label| row.get_or_null(label)))
    }
}

/// The concrete type of an entity instance.
fn select_type(row: &Row, mapping: &EntityMapping) -> Arc<TypeDescriptor> {
    match mapping.strategy {
        InheritanceStrategy::Vertical => mapping
            .levels
            .iter()
            .filter(|level| level.role == LevelRole::Subclass)
            .filter(|level| {
                level
                    .key_labels
                    .iter()
                    .any(|label| !row.get_or_null(label).is_null())
            })
            .max_by_key(|level| level.owner.ancestors().count())
            .map_or_else(|| Arc::clone(&mapping.declared), |level| Arc::clone(&level.owner)),
        InheritanceStrategy::Discriminated => {
            let Some(discriminator) = &mapping.discriminator else {
                return Arc::clone(&mapping.declared);
            };
            let stored = match row.get_or_null(&discriminator.label) {
                Value::Null => None,
                Value::Text(s) => Some(s.clone()),
                other => Some(coerce::to_json(other).to_string()),
            };
            stored
                .and_then(|name| {
                    discriminator
                        .candidates
                        .iter()
                        .find(|c| c.registered_name() == name)
                })
                .map_or_else(
                    || Arc::clone(&discriminator.fallback),
                    Arc::clone,
                )
        }
        InheritanceStrategy::None => Arc::clone(&mapping.declared),
    }
}

fn coercion_error(field: &FieldDescriptor, path: &str, rejected: Rejected) -> Error {
    Error::Coercion(CoercionError {
        type_name: field.owner.clone(),
        field: field.name.clone(),
        alias: path.to_string(),
        expected: rejected.expected,
        found: rejected.found,
        message: rejected.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{DynamicSource, FieldDef, TypeDef, ValueType};
    use rowgraph_query::build;

    fn rows(pairs: &[&[(&str, Value)]]) -> Vec<Row> {
        pairs
            .iter()
            .map(|r| Row::from_pairs(r.iter().map(|(k, v)| (*k, v.clone()))))
            .collect()
    }

    fn department_catalog() -> Catalog {
        Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Department")
                        .table("department")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::value("title", ValueType::Text))
                        .field(FieldDef::named("staff", "Employee").list())
                        .field(FieldDef::named("status", "Status")),
                )
                .with(
                    TypeDef::new("Employee")
                        .table("employee")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::value("name", ValueType::Text)),
                )
                .with(TypeDef::new("Status").enumeration(["OPEN", "CLOSED"])),
        )
    }

    #[test]
    fn test_fan_out_dedups_root() {
        let catalog = department_catalog();
        let plan = build(&catalog, "Department").unwrap();
        let input = rows(&[
            &[
                ("department.id", Value::Int(1)),
                ("department.title", Value::Text("R&D".into())),
                ("department.status", Value::Text("OPEN".into())),
                ("staff.id", Value::Int(10)),
                ("staff.name", Value::Text("Ada".into())),
            ],
            &[
                ("department.id", Value::Int(1)),
                ("department.title", Value::Text("R&D".into())),
                ("department.status", Value::Text("OPEN".into())),
                ("staff.id", Value::Int(12)),
                ("staff.name", Value::Text("Grace".into())),
            ],
            &[
                ("department.id", Value::Int(1)),
                ("department.title", Value::Text("R&D".into())),
                ("department.status", Value::Text("OPEN".into())),
                ("staff.id", Value::Int(11)),
                ("staff.name", Value::Text("Edsger".into())),
            ],
        ]);
        let graph = Materializer::new(&plan, &catalog)
            .materialize_rows(&input)
            .unwrap();

        assert_eq!(graph.len(), 1);
        let department = graph.roots().next().unwrap();
        let names: Vec<_> = graph
            .children(department, "staff")
            .iter()
            .map(|e| e.value("name").cloned().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                Value::Text("Ada".into()),
                Value::Text("Grace".into()),
                Value::Text("Edsger".into())
            ]
        );
        assert_eq!(department.value("id"), Some(&Value::BigInt(1)));
    }

    #[test]
    fn test_empty_collection_on_left_join_miss() {
        let catalog = department_catalog();
        let plan = build(&catalog, "Department").unwrap();
        let input = rows(&[&[
            ("department.id", Value::Int(2)),
            ("department.title", Value::Null),
            ("staff.id", Value::Null),
            ("staff.name", Value::Null),
        ]]);
        let graph = Materializer::new(&plan, &catalog)
            .materialize_rows(&input)
            .unwrap();
        let department = graph.roots().next().unwrap();
        assert_eq!(department.get("staff"), Some(&Slot::List(Vec::new())));
        assert_eq!(graph.object_count(), 1);
    }

    #[test]
    fn test_unknown_enum_constant_is_reported() {
        let catalog = department_catalog();
        let plan = build(&catalog, "Department").unwrap();
        let input = rows(&[&[
            ("department.id", Value::Int(3)),
            ("department.status", Value::Text("ARCHIVED".into())),
        ]]);
        let err = Materializer::new(&plan, &catalog)
            .materialize_rows(&input)
            .unwrap_err();
        let Error::Coercion(c) = err else {
            panic!("expected coercion error, got {err}");
        };
        assert_eq!(c.type_name, "Department");
        assert_eq!(c.field, "status");
        assert_eq!(c.alias, "department");
    }

    #[test]
    fn test_stream_emits_each_root() {
        let catalog = department_catalog();
        let plan = build(&catalog, "Department").unwrap();
        let input = rows(&[
            &[("department.id", Value::Int(1)), ("staff.id", Value::Int(10))],
            &[("department.id", Value::Int(1)), ("staff.id", Value::Int(11))],
            &[("department.id", Value::Int(2)), ("staff.id", Value::Int(10))],
        ]);
        let graphs: Vec<ObjectGraph> = Materializer::new(&plan, &catalog)
            .stream(input.into_iter().map(Ok))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(graphs.len(), 2);
        let first = graphs[0].roots().next().unwrap();
        assert_eq!(graphs[0].children(first, "staff").len(), 2);
        let second = graphs[1].roots().next().unwrap();
        assert_eq!(second.value("id"), Some(&Value::BigInt(2)));
        assert_eq!(graphs[1].children(second, "staff").len(), 1);
    }

    #[test]
    fn test_stream_stops_on_source_error() {
        let catalog = department_catalog();
        let plan = build(&catalog, "Department").unwrap();
        let input: Vec<Result<Row>> = vec![
            Ok(Row::from_pairs([("department.id", Value::Int(1))])),
            Err(Error::Source(rowgraph_core::SourceError::new("connection reset"))),
        ];
        let mut stream = Materializer::new(&plan, &catalog).stream(input);
        assert!(matches!(stream.next(), Some(Err(Error::Source(_)))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_keyless_entity_uses_all_columns() {
        let catalog = Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Order")
                        .table("orders")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::named("lines", "Line").list()),
                )
                .with(
                    TypeDef::new("Line")
                        .table("line")
                        .field(FieldDef::value("sku", ValueType::Text))
                        .field(FieldDef::value("qty", ValueType::Int)),
                ),
        );
        let plan = build(&catalog, "Order").unwrap();
        let input = rows(&[
            &[
                ("orders.id", Value::Int(1)),
                ("lines.sku", Value::Text("A".into())),
                ("lines.qty", Value::Int(2)),
            ],
            &[
                ("orders.id", Value::Int(1)),
                ("lines.sku", Value::Text("A".into())),
                ("lines.qty", Value::Int(2)),
            ],
            &[
                ("orders.id", Value::Int(1)),
                ("lines.sku", Value::Text("B".into())),
                ("lines.qty", Value::Int(1)),
            ],
        ]);
        let graph = Materializer::new(&plan, &catalog)
            .materialize_rows(&input)
            .unwrap();
        let order = graph.roots().next().unwrap();
        assert_eq!(graph.children(order, "lines").len(), 2);
    }
}
