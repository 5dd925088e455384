//! Field declarations and their mapping attributes.
//!
//! The same attribute vocabulary is used by the static metadata (`&'static str`
//! payloads, built with `const fn`) and by the runtime metadata (`String`
//! payloads, built at runtime or deserialized). Both are generic over the
//! string type `S`.

use serde::{Deserialize, Serialize};

/// Scalar value mapping of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Boolean
    Bool,
    /// 8-bit integer
    TinyInt,
    /// 16-bit integer
    SmallInt,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    BigInt,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Decimal kept as text
    Decimal,
    /// Text
    Text,
    /// Binary
    Bytes,
    /// Date
    Date,
    /// Time of day
    Time,
    /// Timestamp without zone
    Timestamp,
    /// Timestamp with zone
    TimestampTz,
    /// UUID
    Uuid,
    /// JSON document
    Json,
}

impl ValueType {
    /// Check if this is an integral type.
    #[must_use]
    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            ValueType::TinyInt | ValueType::SmallInt | ValueType::Int | ValueType::BigInt
        )
    }

    /// Check if this is a date/time type.
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(
            self,
            ValueType::Date | ValueType::Time | ValueType::Timestamp | ValueType::TimestampTz
        )
    }

    /// SQL-ish name used in diagnostics.
    #[must_use]
    pub const fn sql_name(&self) -> &'static str {
        match self {
            ValueType::Bool => "BOOLEAN",
            ValueType::TinyInt => "TINYINT",
            ValueType::SmallInt => "SMALLINT",
            ValueType::Int => "INTEGER",
            ValueType::BigInt => "BIGINT",
            ValueType::Float => "REAL",
            ValueType::Double => "DOUBLE",
            ValueType::Decimal => "DECIMAL",
            ValueType::Text => "TEXT",
            ValueType::Bytes => "BLOB",
            ValueType::Date => "DATE",
            ValueType::Time => "TIME",
            ValueType::Timestamp => "TIMESTAMP",
            ValueType::TimestampTz => "TIMESTAMPTZ",
            ValueType::Uuid => "UUID",
            ValueType::Json => "JSON",
        }
    }
}

/// Declared type of a field: a scalar value mapping or a named type.
///
/// Named types are resolved through the catalog: they may be table-mapped
/// (relations), enums, or embeddable value objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType<S = String> {
    /// A primitive/value mapping.
    Value(ValueType),
    /// A reference to another declared type.
    Named(S),
}

/// How many values a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// A single value or reference.
    #[default]
    One,
    /// A growable collection.
    List,
    /// A fixed-size array, finalized after materialization.
    Array,
}

impl Cardinality {
    /// Check if the field holds many values.
    #[must_use]
    pub const fn is_many(&self) -> bool {
        !matches!(self, Cardinality::One)
    }
}

/// Table inheritance strategy, resolved once per hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceStrategy {
    /// No inheritance: the ancestry contributes a single table.
    #[default]
    None,
    /// Each class level has its own table sharing the primary key with its parent.
    ///
    /// Example:
    /// ```ignore
    /// // person(id, name)  employee(id, salary)
    /// TypeInfo::new("Person").table("person").subclasses(&["Employee"])
    /// TypeInfo::new("Employee").table("employee").superclass("Person")
    /// ```
    Vertical,
    /// All subclasses share one table; a discriminator column names the subtype.
    ///
    /// Example:
    /// ```ignore
    /// TypeInfo::new("Room").table("room").discriminator("kind").subclasses(&["Suite"])
    /// TypeInfo::new("Suite").superclass("Room").discriminator_value("suite")
    /// ```
    Discriminated,
}

impl InheritanceStrategy {
    /// Check if this strategy uses a discriminator column.
    #[must_use]
    pub const fn uses_discriminator(&self) -> bool {
        matches!(self, Self::Discriminated)
    }

    /// Check if this strategy joins one table per level.
    #[must_use]
    pub const fn requires_join(&self) -> bool {
        matches!(self, Self::Vertical)
    }
}

/// A physical table name with optional schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de>"))]
pub struct TableName<S = String> {
    /// Schema name.
    #[serde(default)]
    pub schema: Option<S>,
    /// Table name.
    pub name: S,
}

impl TableName<&'static str> {
    /// Create an unqualified static table name.
    pub const fn new(name: &'static str) -> Self {
        Self { schema: None, name }
    }

    /// Create a schema-qualified static table name.
    pub const fn qualified(schema: &'static str, name: &'static str) -> Self {
        Self {
            schema: Some(schema),
            name,
        }
    }
}

impl<S: AsRef<str>> TableName<S> {
    /// Convert into an owned table name.
    pub fn to_owned_name(&self) -> TableName {
        TableName {
            schema: self.schema.as_ref().map(|s| s.as_ref().to_string()),
            name: self.name.as_ref().to_string(),
        }
    }
}

/// Link table of a many-to-many relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de>"))]
pub struct LinkTable<S = String> {
    /// The link table (e.g., `"article_tag"`).
    pub table: TableName<S>,
    /// Column in the link table pointing to the owner (default `<owner_table>_id`).
    #[serde(default)]
    pub owner_column: Option<S>,
    /// Column in the link table pointing to the target (default `<target_table>_id`).
    #[serde(default)]
    pub target_column: Option<S>,
}

impl LinkTable<&'static str> {
    /// Create a link-table definition with inferred columns.
    pub const fn new(table: &'static str) -> Self {
        Self {
            table: TableName::new(table),
            owner_column: None,
            target_column: None,
        }
    }

    /// Set the column pointing to the owner.
    pub const fn owner_column(mut self, column: &'static str) -> Self {
        self.owner_column = Some(column);
        self
    }

    /// Set the column pointing to the target.
    pub const fn target_column(mut self, column: &'static str) -> Self {
        self.target_column = Some(column);
        self
    }
}

impl<S: AsRef<str>> LinkTable<S> {
    /// Convert into an owned link table.
    pub fn to_owned_link(&self) -> LinkTable {
        LinkTable {
            table: self.table.to_owned_name(),
            owner_column: self.owner_column.as_ref().map(|s| s.as_ref().to_string()),
            target_column: self.target_column.as_ref().map(|s| s.as_ref().to_string()),
        }
    }
}

/// Mapping attributes attached to a field.
///
/// Every attribute is optional so that two attribute sets (native and
/// compatibility) can be merged attribute by attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de>"))]
pub struct FieldAttrs<S = String> {
    /// Part of the primary key.
    #[serde(default)]
    pub id: Option<bool>,
    /// Not persisted; never selected.
    #[serde(default)]
    pub transient: Option<bool>,
    /// Value object flattened into the owner's columns.
    #[serde(default)]
    pub embedded: Option<bool>,
    /// Column prefix of an embedded value object (default `<field>_`).
    #[serde(default)]
    pub prefix: Option<S>,
    /// Large object column.
    #[serde(default)]
    pub lob: Option<bool>,
    /// Explicit column name.
    #[serde(default)]
    pub column: Option<S>,
    /// Explicit foreign key column for a join.
    #[serde(default)]
    pub join_column: Option<S>,
    /// Link table of a many-to-many relation.
    #[serde(default)]
    pub link: Option<LinkTable<S>>,
    /// Custom ON clause with `{this}`, `{linktable}` and `{<field>}` markers.
    ///
    /// For a relation through a link table this replaces only the
    /// link-to-target join; the owner-to-link join is always inferred from
    /// the link table's owner column.
    #[serde(default)]
    pub join_condition: Option<S>,
    /// Raw select expression replacing the column reference.
    #[serde(default)]
    pub sql: Option<S>,
    /// Contributes its column to GROUP BY.
    #[serde(default)]
    pub group_by: Option<bool>,
}

impl<S> Default for FieldAttrs<S> {
    fn default() -> Self {
        Self {
            id: None,
            transient: None,
            embedded: None,
            prefix: None,
            lob: None,
            column: None,
            join_column: None,
            link: None,
            join_condition: None,
            sql: None,
            group_by: None,
        }
    }
}

impl FieldAttrs<&'static str> {
    /// An empty static attribute set.
    pub const fn new() -> Self {
        Self {
            id: None,
            transient: None,
            embedded: None,
            prefix: None,
            lob: None,
            column: None,
            join_column: None,
            link: None,
            join_condition: None,
            sql: None,
            group_by: None,
        }
    }

    /// Mark as primary key.
    pub const fn id(mut self) -> Self {
        self.id = Some(true);
        self
    }

    /// Mark as transient.
    pub const fn transient(mut self) -> Self {
        self.transient = Some(true);
        self
    }

    /// Mark as embedded value object.
    pub const fn embedded(mut self) -> Self {
        self.embedded = Some(true);
        self
    }

    /// Set the column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column = Some(name);
        self
    }

    /// Set the join column.
    pub const fn join_column(mut self, name: &'static str) -> Self {
        self.join_column = Some(name);
        self
    }

    /// Set the link table.
    pub const fn link(mut self, link: LinkTable<&'static str>) -> Self {
        self.link = Some(link);
        self
    }
}

impl<S: AsRef<str>> FieldAttrs<S> {
    /// Convert into an owned attribute set.
    pub fn to_owned_attrs(&self) -> FieldAttrs {
        let own = |s: &Option<S>| s.as_ref().map(|s| s.as_ref().to_string());
        FieldAttrs {
            id: self.id,
            transient: self.transient,
            embedded: self.embedded,
            prefix: own(&self.prefix),
            lob: self.lob,
            column: own(&self.column),
            join_column: own(&self.join_column),
            link: self.link.as_ref().map(LinkTable::to_owned_link),
            join_condition: own(&self.join_condition),
            sql: own(&self.sql),
            group_by: self.group_by,
        }
    }
}

impl FieldAttrs {
    /// Merge two attribute sets; every attribute present in `self` wins.
    #[must_use]
    pub fn or(self, fallback: FieldAttrs) -> FieldAttrs {
        FieldAttrs {
            id: self.id.or(fallback.id),
            transient: self.transient.or(fallback.transient),
            embedded: self.embedded.or(fallback.embedded),
            prefix: self.prefix.or(fallback.prefix),
            lob: self.lob.or(fallback.lob),
            column: self.column.or(fallback.column),
            join_column: self.join_column.or(fallback.join_column),
            link: self.link.or(fallback.link),
            join_condition: self.join_condition.or(fallback.join_condition),
            sql: self.sql.or(fallback.sql),
            group_by: self.group_by.or(fallback.group_by),
        }
    }
}

/// Static metadata about a declared field.
///
/// Designed to be emitted as `const` data:
///
/// ```
/// use rowgraph_core::field::{FieldInfo, LinkTable, ValueType};
///
/// const ID: FieldInfo = FieldInfo::value("id", ValueType::BigInt).id();
/// const TAGS: FieldInfo = FieldInfo::named("tags", "Tag")
///     .list()
///     .link_table(LinkTable::new("article_tag"));
/// assert_eq!(ID.attrs.id, Some(true));
/// assert!(TAGS.cardinality.is_many());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    /// Field name
    pub name: &'static str,
    /// Declared type
    pub ty: FieldType<&'static str>,
    /// Single value or collection
    pub cardinality: Cardinality,
    /// Native attributes
    pub attrs: FieldAttrs<&'static str>,
    /// Compatibility (JPA-style) attributes; native ones take precedence
    pub compat: FieldAttrs<&'static str>,
}

impl FieldInfo {
    /// Create a field with an explicit declared type.
    pub const fn new(name: &'static str, ty: FieldType<&'static str>) -> Self {
        Self {
            name,
            ty,
            cardinality: Cardinality::One,
            attrs: FieldAttrs::new(),
            compat: FieldAttrs::new(),
        }
    }

    /// Create a scalar field.
    pub const fn value(name: &'static str, ty: ValueType) -> Self {
        Self::new(name, FieldType::Value(ty))
    }

    /// Create a field referencing another declared type.
    pub const fn named(name: &'static str, type_name: &'static str) -> Self {
        Self::new(name, FieldType::Named(type_name))
    }

    /// Hold a growable collection.
    pub const fn list(mut self) -> Self {
        self.cardinality = Cardinality::List;
        self
    }

    /// Hold a fixed-size array.
    pub const fn array(mut self) -> Self {
        self.cardinality = Cardinality::Array;
        self
    }

    /// Mark as primary key.
    pub const fn id(mut self) -> Self {
        self.attrs.id = Some(true);
        self
    }

    /// Mark as transient (never selected).
    pub const fn transient(mut self) -> Self {
        self.attrs.transient = Some(true);
        self
    }

    /// Mark as embedded value object.
    pub const fn embedded(mut self) -> Self {
        self.attrs.embedded = Some(true);
        self
    }

    /// Set the column prefix of an embedded value object.
    pub const fn prefix(mut self, prefix: &'static str) -> Self {
        self.attrs.embedded = Some(true);
        self.attrs.prefix = Some(prefix);
        self
    }

    /// Mark as large object column.
    pub const fn lob(mut self) -> Self {
        self.attrs.lob = Some(true);
        self
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.attrs.column = Some(name);
        self
    }

    /// Set the foreign key column used by the join.
    pub const fn join_column(mut self, name: &'static str) -> Self {
        self.attrs.join_column = Some(name);
        self
    }

    /// Route a collection through a link table.
    pub const fn link_table(mut self, link: LinkTable<&'static str>) -> Self {
        self.attrs.link = Some(link);
        self
    }

    /// Replace the generated ON clause (the link-to-target one for link tables).
    pub const fn join_condition(mut self, condition: &'static str) -> Self {
        self.attrs.join_condition = Some(condition);
        self
    }

    /// Select a raw SQL expression instead of a column.
    pub const fn sql(mut self, expression: &'static str) -> Self {
        self.attrs.sql = Some(expression);
        self
    }

    /// Contribute this column to GROUP BY.
    pub const fn group_by(mut self) -> Self {
        self.attrs.group_by = Some(true);
        self
    }

    /// Attach compatibility attributes.
    pub const fn compat(mut self, attrs: FieldAttrs<&'static str>) -> Self {
        self.compat = attrs;
        self
    }
}
