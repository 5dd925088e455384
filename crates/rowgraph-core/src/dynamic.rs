//! Runtime type definitions.
//!
//! Provides `TypeDef`/`FieldDef` for types whose mapping is only known at
//! runtime (assembled programmatically or loaded from JSON), and
//! `DynamicSource`, the metadata source that serves them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigErrorKind, Result};
use crate::field::{Cardinality, FieldAttrs, FieldType, LinkTable, TableName, ValueType};
use crate::metadata::{MetadataSource, SourceKind};

/// A field definition for runtime metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub ty: FieldType,
    /// Single value or collection.
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Native attributes.
    #[serde(default)]
    pub attrs: FieldAttrs,
    /// Compatibility attributes; native ones take precedence.
    #[serde(default)]
    pub compat: FieldAttrs,
}

impl FieldDef {
    /// Create a field with an explicit declared type.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            cardinality: Cardinality::One,
            attrs: FieldAttrs::default(),
            compat: FieldAttrs::default(),
        }
    }

    /// Create a scalar field.
    pub fn value(name: impl Into<String>, ty: ValueType) -> Self {
        Self::new(name, FieldType::Value(ty))
    }

    /// Create a field referencing another declared type.
    pub fn named(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Named(type_name.into()))
    }

    /// Hold a growable collection.
    pub fn list(mut self) -> Self {
        self.cardinality = Cardinality::List;
        self
    }

    /// Hold a fixed-size array.
    pub fn array(mut self) -> Self {
        self.cardinality = Cardinality::Array;
        self
    }

    /// Mark as primary key.
    pub fn id(mut self) -> Self {
        self.attrs.id = Some(true);
        self
    }

    /// Mark as transient.
    pub fn transient(mut self) -> Self {
        self.attrs.transient = Some(true);
        self
    }

    /// Mark as embedded value object.
    pub fn embedded(mut self) -> Self {
        self.attrs.embedded = Some(true);
        self
    }

    /// Set the embedded column prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attrs.embedded = Some(true);
        self.attrs.prefix = Some(prefix.into());
        self
    }

    /// Mark as large object.
    pub fn lob(mut self) -> Self {
        self.attrs.lob = Some(true);
        self
    }

    /// Set the column name.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.attrs.column = Some(name.into());
        self
    }

    /// Set the join column.
    pub fn join_column(mut self, name: impl Into<String>) -> Self {
        self.attrs.join_column = Some(name.into());
        self
    }

    /// Route a collection through a link table.
    pub fn link_table(mut self, link: LinkTable) -> Self {
        self.attrs.link = Some(link);
        self
    }

    /// Replace the generated ON clause (the link-to-target one for link tables).
    pub fn join_condition(mut self, condition: impl Into<String>) -> Self {
        self.attrs.join_condition = Some(condition.into());
        self
    }

    /// Select a raw SQL expression instead of a column.
    pub fn sql(mut self, expression: impl Into<String>) -> Self {
        self.attrs.sql = Some(expression.into());
        self
    }

    /// Contribute this column to GROUP BY.
    pub fn group_by(mut self) -> Self {
        self.attrs.group_by = Some(true);
        self
    }

    /// Attach compatibility attributes.
    pub fn compat(mut self, attrs: FieldAttrs) -> Self {
        self.compat = attrs;
        self
    }
}

/// A type definition for runtime metadata.
///
/// # Example
///
/// ```
/// use rowgraph_core::dynamic::{FieldDef, TypeDef};
/// use rowgraph_core::field::ValueType;
///
/// let article = TypeDef::new("blog::Article")
///     .table("article")
///     .field(FieldDef::value("id", ValueType::BigInt).id())
///     .field(FieldDef::value("title", ValueType::Text))
///     .field(FieldDef::named("author", "blog::User"));
///
/// assert_eq!(article.fields.len(), 3);
/// assert_eq!(article.table.as_ref().map(|t| t.name.as_str()), Some("article"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeDef {
    /// Qualified type name.
    pub name: String,
    /// Simple name (defaults to the last path segment of `name`).
    pub simple_name: Option<String>,
    /// Parent type name.
    pub superclass: Option<String>,
    /// Native table mapping.
    pub table: Option<TableName>,
    /// Compatibility table mapping.
    pub compat_table: Option<TableName>,
    /// Fields declared on this type (not inherited ones).
    pub fields: Vec<FieldDef>,
    /// Registered subclasses.
    pub subclasses: Vec<String>,
    /// Native discriminator column (marks a single-table hierarchy).
    pub discriminator: Option<String>,
    /// Compatibility discriminator column.
    pub compat_discriminator: Option<String>,
    /// Registered name stored in the discriminator column.
    pub discriminator_value: Option<String>,
    /// Whether this type is an enumeration.
    pub is_enum: bool,
    /// Enumeration constants, by name.
    pub enum_constants: Vec<String>,
    /// Whether this type may be embedded as a value object.
    pub embeddable: bool,
    /// Extra raw joins appended after the walk.
    pub joins: Vec<String>,
    /// Extra GROUP BY fragments appended after the walk.
    pub group_by: Vec<String>,
}

impl TypeDef {
    /// Create an empty type definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Map to a table.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(TableName {
            schema: None,
            name: name.into(),
        });
        self
    }

    /// Map to a schema-qualified table.
    pub fn table_in(mut self, schema: impl Into<String>, name: impl Into<String>) -> Self {
        self.table = Some(TableName {
            schema: Some(schema.into()),
            name: name.into(),
        });
        self
    }

    /// Map to a table through compatibility metadata.
    pub fn compat_table(mut self, name: impl Into<String>) -> Self {
        self.compat_table = Some(TableName {
            schema: None,
            name: name.into(),
        });
        self
    }

    /// Set the parent type.
    pub fn superclass(mut self, name: impl Into<String>) -> Self {
        self.superclass = Some(name.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Register a subclass.
    pub fn subclass(mut self, name: impl Into<String>) -> Self {
        self.subclasses.push(name.into());
        self
    }

    /// Declare the discriminator column of a single-table hierarchy.
    pub fn discriminator(mut self, column: impl Into<String>) -> Self {
        self.discriminator = Some(column.into());
        self
    }

    /// Set the name stored in the discriminator column for this type.
    pub fn discriminator_value(mut self, value: impl Into<String>) -> Self {
        self.discriminator_value = Some(value.into());
        self
    }

    /// Declare an enumeration with the given constants.
    pub fn enumeration<I, S>(mut self, constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.is_enum = true;
        self.enum_constants = constants.into_iter().map(Into::into).collect();
        self
    }

    /// Allow embedding as a value object.
    pub fn embeddable(mut self) -> Self {
        self.embeddable = true;
        self
    }

    /// Append a raw join (may use `{this}`).
    pub fn join(mut self, sql: impl Into<String>) -> Self {
        self.joins.push(sql.into());
        self
    }

    /// Append a GROUP BY fragment (may use `{this}`).
    pub fn group(mut self, sql: impl Into<String>) -> Self {
        self.group_by.push(sql.into());
        self
    }
}

/// Metadata source backed by runtime type definitions.
#[derive(Debug, Clone, Default)]
pub struct DynamicSource {
    types: HashMap<String, TypeDef>,
}

impl DynamicSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing any previous one with the same name.
    pub fn add(&mut self, def: TypeDef) {
        self.types.insert(def.name.clone(), def);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, def: TypeDef) -> Self {
        self.add(def);
        self
    }

    /// Load definitions from a JSON array of type definitions.
    pub fn from_json(json: &str) -> Result<Self> {
        let defs: Vec<TypeDef> = serde_json::from_str(json).map_err(|e| {
            ConfigError::new(
                ConfigErrorKind::InvalidDefinition,
                format!("invalid type definitions: {e}"),
            )
        })?;
        let mut source = Self::new();
        for def in defs {
            source.add(def);
        }
        Ok(source)
    }

    /// Number of known types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no types are known.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MetadataSource for DynamicSource {
    fn type_def(&self, name: &str) -> Option<TypeDef> {
        self.types.get(name).cloned()
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Runtime
    }
}
