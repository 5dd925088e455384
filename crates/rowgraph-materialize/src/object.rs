//! The materialized object graph.
//!
//! Objects live in a flat arena and point at each other through [`ObjectId`]s,
//! never through owning references, so a graph in which one instance is
//! reachable from several parents needs no reference counting.

use serde::de::DeserializeOwned;
use serde_json::Map;

use rowgraph_core::{CoercionError, Error, Result, Value};

use crate::coerce;

/// Index of an object in its [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    /// Arena position.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// The content of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// A scalar or enum value.
    Value(Value),
    /// A to-one relation.
    Ref(ObjectId),
    /// A growable collection, in first-appearance order.
    List(Vec<ObjectId>),
    /// A fixed-size collection, finalized after the last row.
    Array(Vec<ObjectId>),
    /// An embedded value object.
    Embedded(Box<Object>),
}

/// One materialized instance (entity or embedded value object).
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Concrete type, after subtype selection.
    pub type_name: String,
    /// Alias path the instance was read from.
    pub path: String,
    /// Fields in population order.
    pub fields: Vec<(String, Slot)>,
}

impl Object {
    /// Create an object with no fields.
    pub fn new(type_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            path: path.into(),
            fields: Vec::new(),
        }
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Look up a field for modification.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    /// The scalar value of a field, if it holds one.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(Slot::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// The embedded object of a field, if set.
    pub fn embedded(&self, name: &str) -> Option<&Object> {
        match self.get(name) {
            Some(Slot::Embedded(o)) => Some(o),
            _ => None,
        }
    }

    /// Set a field, replacing any previous content.
    pub fn set(&mut self, name: impl Into<String>, slot: Slot) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(existing) => *existing = slot,
            None => self.fields.push((name, slot)),
        }
    }

    /// Walk down a chain of embedded fields, creating missing value objects
    /// from `(field, type)` pairs.
    pub(crate) fn embedded_mut(&mut self, chain: &[(String, String)]) -> Option<&mut Object> {
        let Some(((field, type_name), rest)) = chain.split_first() else {
            return Some(self);
        };
        if !matches!(self.get(field), Some(Slot::Embedded(_))) {
            let path = self.path.clone();
            self.set(
                field.clone(),
                Slot::Embedded(Box::new(Object::new(type_name.clone(), path))),
            );
        }
        let Some(Slot::Embedded(inner)) = self.get_mut(field) else {
            return None;
        };
        inner.embedded_mut(rest)
    }

    fn finalize_arrays(&mut self, arrays: &[Vec<String>]) {
        for chain in arrays {
            let Some((last, embeds)) = chain.split_last() else {
                continue;
            };
            let mut target = Some(&mut *self);
            for name in embeds {
                target = match target.and_then(|o| o.get_mut(name)) {
                    Some(Slot::Embedded(inner)) => Some(inner.as_mut()),
                    _ => None,
                };
            }
            if let Some(slot) = target.and_then(|o| o.get_mut(last)) {
                if let Slot::List(items) = slot {
                    *slot = Slot::Array(std::mem::take(items));
                }
            }
        }
    }
}

/// The result of one materialization: an arena of objects plus the roots in
/// first-appearance order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectGraph {
    pub(crate) objects: Vec<Object>,
    pub(crate) roots: Vec<ObjectId>,
}

impl ObjectGraph {
    pub(crate) fn push(&mut self, object: Object) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.0]
    }

    pub(crate) fn finalize(&mut self, arrays: &[(ObjectId, Vec<Vec<String>>)]) {
        for (id, chains) in arrays {
            self.objects[id.0].finalize_arrays(chains);
        }
    }

    /// Look up an object.
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.0)
    }

    /// Root ids in first-appearance order.
    pub fn root_ids(&self) -> &[ObjectId] {
        &self.roots
    }

    /// Root objects in first-appearance order.
    pub fn roots(&self) -> impl Iterator<Item = &Object> {
        self.roots.iter().filter_map(|id| self.get(*id))
    }

    /// Number of root objects.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// True if no root was materialized.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of distinct instances, roots and descendants.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// The object a to-one field refers to.
    pub fn follow(&self, object: &Object, field: &str) -> Option<&Object> {
        match object.get(field) {
            Some(Slot::Ref(id)) => self.get(*id),
            _ => None,
        }
    }

    /// The objects of a to-many field, in collection order.
    pub fn children<'g>(&'g self, object: &'g Object, field: &str) -> Vec<&'g Object> {
        match object.get(field) {
            Some(Slot::List(ids) | Slot::Array(ids)) => {
                ids.iter().filter_map(|id| self.get(*id)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Render one object, with everything it references, as JSON.
    pub fn object_to_json(&self, id: ObjectId) -> serde_json::Value {
        self.get(id)
            .map_or(serde_json::Value::Null, |o| self.render(o))
    }

    /// Render the roots as a JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.roots
                .iter()
                .map(|id| self.object_to_json(*id))
                .collect(),
        )
    }

    fn render(&self, object: &Object) -> serde_json::Value {
        let mut map = Map::new();
        for (name, slot) in &object.fields {
            let value = match slot {
                Slot::Value(v) => coerce::to_json(v),
                Slot::Ref(id) => self.object_to_json(*id),
                Slot::List(ids) | Slot::Array(ids) => serde_json::Value::Array(
                    ids.iter().map(|id| self.object_to_json(*id)).collect(),
                ),
                Slot::Embedded(inner) => self.render(inner),
            };
            map.insert(name.clone(), value);
        }
        serde_json::Value::Object(map)
    }

    /// Deserialize the roots into caller types.
    pub fn roots_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.roots
            .iter()
            .map(|id| {
                serde_json::from_value(self.object_to_json(*id)).map_err(|e| {
                    let object = self.get(*id);
                    Error::Coercion(CoercionError {
                        type_name: object.map(|o| o.type_name.clone()).unwrap_or_default(),
                        field: String::new(),
                        alias: object.map(|o| o.path.clone()).unwrap_or_default(),
                        expected: std::any::type_name::<T>().to_string(),
                        found: "materialized object".to_string(),
                        message: e.to_string(),
                    })
                })
            })
            .collect()
    }
}
