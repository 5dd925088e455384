//! Uniform metadata model.
//!
//! A [`Catalog`] turns raw definitions served by any [`MetadataSource`] (static
//! or runtime) into immutable, shared [`TypeDescriptor`]s. The rest of the
//! pipeline only ever sees descriptors, so it is agnostic to when metadata was
//! produced.
//!
//! Descriptors are built once per type and cached for the lifetime of the
//! catalog. Concurrent first builds of the same type race benignly: both
//! produce equivalent descriptors and the first one inserted is kept.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::dynamic::{FieldDef, TypeDef};
use crate::error::{ConfigError, ConfigErrorKind, Result};
use crate::field::{Cardinality, FieldAttrs, FieldType, LinkTable, TableName, ValueType};

/// Where a source's metadata comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Produced at compile time (static `TypeInfo`).
    Static,
    /// Produced at runtime (programmatic or loaded definitions).
    Runtime,
}

/// A provider of raw type definitions.
pub trait MetadataSource: Send + Sync + fmt::Debug {
    /// The definition of `name`, if this source knows it.
    fn type_def(&self, name: &str) -> Option<TypeDef>;

    /// What kind of source this is.
    fn kind(&self) -> SourceKind;
}

/// How a field participates in the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// A primitive/value mapping.
    Scalar(ValueType),
    /// A string column resolved against enum constants.
    Enum,
    /// A reference or collection of a table-mapped type.
    Relation,
    /// A value object flattened into the owner's columns.
    Embedded,
}

/// Resolved metadata of one declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub ty: FieldType,
    /// Single value or collection.
    pub cardinality: Cardinality,
    /// Name of the type declaring this field.
    pub owner: String,
    /// Mapping class.
    pub class: FieldClass,
    /// Part of the primary key.
    pub id: bool,
    /// Never selected.
    pub transient: bool,
    /// Large object column.
    pub lob: bool,
    /// Physical column name (override or field name).
    pub column: String,
    /// Explicit foreign key column.
    pub join_column: Option<String>,
    /// Link table of a many-to-many relation.
    pub link: Option<LinkTable>,
    /// Custom ON clause.
    pub join_condition: Option<String>,
    /// Raw select expression.
    pub sql: Option<String>,
    /// Contributes to GROUP BY.
    pub group_by: bool,
    /// Declared column prefix for embedded value objects.
    pub prefix: Option<String>,
}

impl FieldDescriptor {
    /// The referenced type name, for named types.
    #[must_use]
    pub fn target_type(&self) -> Option<&str> {
        match &self.ty {
            FieldType::Named(n) => Some(n),
            FieldType::Value(_) => None,
        }
    }

    /// Check if this field is a relation to a table-mapped type.
    #[must_use]
    pub fn is_relation(&self) -> bool {
        self.class == FieldClass::Relation
    }

    /// Check if this field is an embedded value object.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.class == FieldClass::Embedded
    }

    /// Column prefix used when flattening an embedded value object.
    #[must_use]
    pub fn embed_prefix(&self) -> String {
        self.prefix
            .clone()
            .unwrap_or_else(|| format!("{}_", self.name))
    }
}

/// Flags describing what kind of type a descriptor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeFlags {
    /// The type or one of its ancestors declares a table.
    pub table_mapped: bool,
    /// The type is an enumeration.
    pub is_enum: bool,
    /// The type may be embedded as a value object.
    pub embeddable: bool,
}

/// Immutable, shared metadata of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Qualified name.
    pub name: String,
    /// Simple name.
    pub simple_name: String,
    /// Parent descriptor.
    pub superclass: Option<Arc<TypeDescriptor>>,
    /// Table declared by this type itself.
    pub table: Option<TableName>,
    /// Fields declared by this type, in declaration order.
    pub fields: Vec<Arc<FieldDescriptor>>,
    /// Registered subclass names.
    pub subclasses: Vec<String>,
    /// Discriminator column declared by this type.
    pub discriminator: Option<String>,
    /// Declared discriminator value.
    pub discriminator_value: Option<String>,
    /// Enum constants.
    pub enum_constants: Vec<String>,
    /// Type flags.
    pub flags: TypeFlags,
    /// Extra raw joins declared by this type.
    pub joins: Vec<String>,
    /// Extra GROUP BY fragments declared by this type.
    pub group_by: Vec<String>,
}

impl TypeDescriptor {
    /// Ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &TypeDescriptor> {
        std::iter::successors(self.superclass.as_deref(), |t| t.superclass.as_deref())
    }

    /// The ancestry from the root-most ancestor down to `self`.
    #[must_use]
    pub fn lineage(&self) -> Vec<&TypeDescriptor> {
        let mut chain: Vec<&TypeDescriptor> = self.ancestors().collect();
        chain.reverse();
        chain.push(self);
        chain
    }

    /// Fields declared by this type, optionally preceded by inherited ones.
    #[must_use]
    pub fn fields(&self, include_ancestors: bool) -> Vec<Arc<FieldDescriptor>> {
        if include_ancestors {
            self.lineage()
                .into_iter()
                .flat_map(|t| t.fields.iter().cloned())
                .collect()
        } else {
            self.fields.clone()
        }
    }

    /// Look up a field by name, including inherited fields.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Arc<FieldDescriptor>> {
        std::iter::once(self)
            .chain(self.ancestors())
            .find_map(|t| t.fields.iter().find(|f| f.name == name).cloned())
    }

    /// Primary key fields, including inherited ones.
    #[must_use]
    pub fn id_fields(&self) -> Vec<Arc<FieldDescriptor>> {
        self.fields(true).into_iter().filter(|f| f.id).collect()
    }

    /// Check whether this type is `name` or inherits from it.
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.ancestors().any(|t| t.name == name)
    }

    /// The name stored in a discriminator column for this type.
    #[must_use]
    pub fn registered_name(&self) -> &str {
        self.discriminator_value
            .as_deref()
            .unwrap_or(&self.simple_name)
    }

    /// Check if this type or an ancestor declares a table.
    #[must_use]
    pub fn has_table_mapping(&self) -> bool {
        self.flags.table_mapped
    }
}

/// Composes metadata sources and caches their descriptors.
///
/// ```
/// use rowgraph_core::dynamic::{DynamicSource, FieldDef, TypeDef};
/// use rowgraph_core::field::ValueType;
/// use rowgraph_core::metadata::Catalog;
///
/// let catalog = Catalog::new().with_source(DynamicSource::new().with(
///     TypeDef::new("Team")
///         .table("team")
///         .field(FieldDef::value("id", ValueType::BigInt).id()),
/// ));
/// let team = catalog.describe("Team").unwrap();
/// assert!(team.has_table_mapping());
/// assert_eq!(team.id_fields().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Catalog {
    sources: Vec<Box<dyn MetadataSource>>,
    cache: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
}

impl Catalog {
    /// Create a catalog with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. Earlier sources take precedence for the same name.
    pub fn with_source(mut self, source: impl MetadataSource + 'static) -> Self {
        self.add_source(source);
        self
    }

    /// Add a source. Earlier sources take precedence for the same name.
    pub fn add_source(&mut self, source: impl MetadataSource + 'static) {
        self.sources.push(Box::new(source));
    }

    /// Number of cached descriptors.
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Describe a type, building and caching its descriptor on first use.
    pub fn describe(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        self.describe_inner(name, &mut Vec::new())
    }

    /// Describe the registered subclasses of `base`.
    ///
    /// Every listed subclass must name `base` as its superclass.
    pub fn subclasses(&self, base: &TypeDescriptor) -> Result<Vec<Arc<TypeDescriptor>>> {
        base.subclasses
            .iter()
            .map(|name| {
                let sub = self.describe(name)?;
                let parent = sub.superclass.as_ref().map(|p| p.name.as_str());
                if parent != Some(base.name.as_str()) {
                    return Err(ConfigError::new(
                        ConfigErrorKind::UnregisteredSubtype,
                        format!(
                            "{} is listed as a subclass of {} but its superclass is {}",
                            sub.name,
                            base.name,
                            parent.unwrap_or("<none>")
                        ),
                    )
                    .for_type(&base.name)
                    .into());
                }
                Ok(sub)
            })
            .collect()
    }

    /// All registered descendants of `base`, depth first, most general first.
    pub fn descendants(&self, base: &TypeDescriptor) -> Result<Vec<Arc<TypeDescriptor>>> {
        let mut out = Vec::new();
        for sub in self.subclasses(base)? {
            let nested = self.descendants(&sub)?;
            out.push(sub);
            out.extend(nested);
        }
        Ok(out)
    }

    fn lookup(&self, name: &str) -> Option<TypeDef> {
        self.sources.iter().find_map(|s| s.type_def(name))
    }

    fn cached_descriptor(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn describe_inner(&self, name: &str, chain: &mut Vec<String>) -> Result<Arc<TypeDescriptor>> {
        if let Some(hit) = self.cached_descriptor(name) {
            return Ok(hit);
        }
        if chain.iter().any(|n| n == name) {
            return Err(ConfigError::new(
                ConfigErrorKind::InvalidDefinition,
                format!("inheritance loop: {} -> {name}", chain.join(" -> ")),
            )
            .for_type(name)
            .into());
        }
        let def = self.lookup(name).ok_or_else(|| {
            ConfigError::new(ConfigErrorKind::UnknownType, format!("no metadata for {name}"))
        })?;
        if def.name.is_empty() {
            return Err(ConfigError::new(
                ConfigErrorKind::InvalidDefinition,
                "type definition without a name",
            )
            .into());
        }

        let superclass = match &def.superclass {
            Some(parent) => {
                chain.push(name.to_string());
                let parent = self.describe_inner(parent, chain);
                chain.pop();
                Some(parent?)
            }
            None => None,
        };

        let fields = def
            .fields
            .iter()
            .map(|f| self.describe_field(&def, f).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let table = def.table.clone().or_else(|| def.compat_table.clone());
        let table_mapped =
            table.is_some() || superclass.as_ref().is_some_and(|s| s.has_table_mapping());
        let simple_name = def
            .simple_name
            .clone()
            .unwrap_or_else(|| simple_name_of(&def.name).to_string());

        let descriptor = TypeDescriptor {
            name: def.name.clone(),
            simple_name,
            superclass,
            table,
            fields,
            subclasses: def.subclasses.clone(),
            discriminator: def
                .discriminator
                .clone()
                .or_else(|| def.compat_discriminator.clone()),
            discriminator_value: def.discriminator_value.clone(),
            enum_constants: def.enum_constants.clone(),
            flags: TypeFlags {
                table_mapped,
                is_enum: def.is_enum,
                embeddable: def.embeddable,
            },
            joins: def.joins.clone(),
            group_by: def.group_by.clone(),
        };

        tracing::debug!(
            type_name = %descriptor.name,
            fields = descriptor.fields.len(),
            table_mapped,
            "Described type"
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(descriptor));
        Ok(Arc::clone(entry))
    }

    fn describe_field(&self, owner: &TypeDef, field: &FieldDef) -> Result<FieldDescriptor> {
        let attrs: FieldAttrs = field.attrs.clone().or(field.compat.clone());
        let class = match &field.ty {
            FieldType::Value(v) => FieldClass::Scalar(*v),
            FieldType::Named(target) => self.classify(owner, field, target, &attrs)?,
        };

        Ok(FieldDescriptor {
            name: field.name.clone(),
            ty: field.ty.clone(),
            cardinality: field.cardinality,
            owner: owner.name.clone(),
            class,
            id: attrs.id.unwrap_or(false),
            transient: attrs.transient.unwrap_or(false),
            lob: attrs.lob.unwrap_or(false),
            column: attrs.column.unwrap_or_else(|| field.name.clone()),
            join_column: attrs.join_column,
            link: attrs.link,
            join_condition: attrs.join_condition,
            sql: attrs.sql,
            group_by: attrs.group_by.unwrap_or(false),
            prefix: attrs.prefix,
        })
    }

    fn classify(
        &self,
        owner: &TypeDef,
        field: &FieldDef,
        target: &str,
        attrs: &FieldAttrs,
    ) -> Result<FieldClass> {
        let Some(def) = self.lookup(target) else {
            return Err(ConfigError::new(
                ConfigErrorKind::UnknownType,
                format!(
                    "field {}.{} has type {target}, which is neither a value mapping nor a known type",
                    owner.name, field.name
                ),
            )
            .for_type(&owner.name)
            .into());
        };
        if def.is_enum {
            return Ok(FieldClass::Enum);
        }
        if self.def_has_table(&def) {
            return Ok(FieldClass::Relation);
        }
        let embeddable = attrs.embedded.unwrap_or(false) || def.embeddable;
        if embeddable && !field.cardinality.is_many() {
            return Ok(FieldClass::Embedded);
        }
        Err(ConfigError::new(
            ConfigErrorKind::UnmappedRelation,
            format!(
                "field {}.{} targets {target}, which has no table mapping and cannot be embedded",
                owner.name, field.name
            ),
        )
        .for_type(&owner.name)
        .into())
    }

    fn def_has_table(&self, def: &TypeDef) -> bool {
        let mut current = Some(def.clone());
        let mut seen: Vec<String> = Vec::new();
        while let Some(d) = current {
            if d.table.is_some() || d.compat_table.is_some() {
                return true;
            }
            if seen.contains(&d.name) {
                return false;
            }
            seen.push(d.name.clone());
            current = d.superclass.as_deref().and_then(|p| self.lookup(p));
        }
        false
    }
}

fn simple_name_of(name: &str) -> &str {
    name.rsplit([':', '.']).next().unwrap_or(name)
}
