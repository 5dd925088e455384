//! Static (compile-time) metadata.
//!
//! Types describe themselves with a `'static` [`TypeInfo`], the shape a derive
//! macro would emit. This lets the pipeline read metadata without any runtime
//! reflection; [`StaticSource`] serves those descriptions to a catalog.

use std::collections::HashMap;

use crate::dynamic::{FieldDef, TypeDef};
use crate::field::{FieldInfo, FieldType, TableName};
use crate::metadata::{MetadataSource, SourceKind};

/// Static description of a mapped, embeddable or enum type.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    /// Qualified type name.
    pub name: &'static str,
    /// Parent type name.
    pub superclass: Option<&'static str>,
    /// Native table mapping.
    pub table: Option<TableName<&'static str>>,
    /// Compatibility table mapping.
    pub compat_table: Option<TableName<&'static str>>,
    /// Fields declared on this type.
    pub fields: &'static [FieldInfo],
    /// Registered subclasses.
    pub subclasses: &'static [&'static str],
    /// Discriminator column (single-table hierarchy base).
    pub discriminator: Option<&'static str>,
    /// Name stored in the discriminator column for this type.
    pub discriminator_value: Option<&'static str>,
    /// Enumeration constants; non-empty for enums.
    pub enum_constants: &'static [&'static str],
    /// Whether this type may be embedded.
    pub embeddable: bool,
    /// Extra raw joins.
    pub joins: &'static [&'static str],
    /// Extra GROUP BY fragments.
    pub group_by: &'static [&'static str],
}

impl TypeInfo {
    /// Create a type with no mapping.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            superclass: None,
            table: None,
            compat_table: None,
            fields: &[],
            subclasses: &[],
            discriminator: None,
            discriminator_value: None,
            enum_constants: &[],
            embeddable: false,
            joins: &[],
            group_by: &[],
        }
    }

    /// Map to a table.
    pub const fn table(mut self, name: &'static str) -> Self {
        self.table = Some(TableName::new(name));
        self
    }

    /// Map to a schema-qualified table.
    pub const fn table_in(mut self, schema: &'static str, name: &'static str) -> Self {
        self.table = Some(TableName::qualified(schema, name));
        self
    }

    /// Map to a table through compatibility metadata.
    pub const fn compat_table(mut self, name: &'static str) -> Self {
        self.compat_table = Some(TableName::new(name));
        self
    }

    /// Set the parent type.
    pub const fn superclass(mut self, name: &'static str) -> Self {
        self.superclass = Some(name);
        self
    }

    /// Set the declared fields.
    pub const fn fields(mut self, fields: &'static [FieldInfo]) -> Self {
        self.fields = fields;
        self
    }

    /// Register subclasses.
    pub const fn subclasses(mut self, names: &'static [&'static str]) -> Self {
        self.subclasses = names;
        self
    }

    /// Declare the discriminator column.
    pub const fn discriminator(mut self, column: &'static str) -> Self {
        self.discriminator = Some(column);
        self
    }

    /// Set this type's discriminator value.
    pub const fn discriminator_value(mut self, value: &'static str) -> Self {
        self.discriminator_value = Some(value);
        self
    }

    /// Declare an enumeration.
    pub const fn enumeration(mut self, constants: &'static [&'static str]) -> Self {
        self.enum_constants = constants;
        self
    }

    /// Allow embedding.
    pub const fn embeddable(mut self) -> Self {
        self.embeddable = true;
        self
    }

    /// Extra raw joins.
    pub const fn joins(mut self, joins: &'static [&'static str]) -> Self {
        self.joins = joins;
        self
    }

    /// Extra GROUP BY fragments.
    pub const fn group_by(mut self, fragments: &'static [&'static str]) -> Self {
        self.group_by = fragments;
        self
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl From<&FieldInfo> for FieldDef {
    fn from(info: &FieldInfo) -> Self {
        let ty = match info.ty {
            FieldType::Value(v) => FieldType::Value(v),
            FieldType::Named(n) => FieldType::Named(n.to_string()),
        };
        FieldDef {
            name: info.name.to_string(),
            ty,
            cardinality: info.cardinality,
            attrs: info.attrs.to_owned_attrs(),
            compat: info.compat.to_owned_attrs(),
        }
    }
}

impl From<&TypeInfo> for TypeDef {
    fn from(info: &TypeInfo) -> Self {
        TypeDef {
            name: info.name.to_string(),
            simple_name: None,
            superclass: info.superclass.map(str::to_string),
            table: info.table.as_ref().map(TableName::to_owned_name),
            compat_table: info.compat_table.as_ref().map(TableName::to_owned_name),
            fields: info.fields.iter().map(FieldDef::from).collect(),
            subclasses: owned(info.subclasses),
            discriminator: info.discriminator.map(str::to_string),
            compat_discriminator: None,
            discriminator_value: info.discriminator_value.map(str::to_string),
            is_enum: !info.enum_constants.is_empty(),
            enum_constants: owned(info.enum_constants),
            embeddable: info.embeddable,
            joins: owned(info.joins),
            group_by: owned(info.group_by),
        }
    }
}

/// A type with static mapping metadata.
///
/// ```
/// use rowgraph_core::entity::{Entity, TypeInfo};
/// use rowgraph_core::field::{FieldInfo, ValueType};
///
/// struct Team;
///
/// impl Entity for Team {
///     fn type_info() -> &'static TypeInfo {
///         const FIELDS: &[FieldInfo] = &[
///             FieldInfo::value("id", ValueType::BigInt).id(),
///             FieldInfo::value("name", ValueType::Text),
///         ];
///         static INFO: TypeInfo = TypeInfo::new("Team").table("team").fields(FIELDS);
///         &INFO
///     }
/// }
///
/// assert_eq!(Team::type_info().fields.len(), 2);
/// ```
pub trait Entity {
    /// The static description of this type.
    fn type_info() -> &'static TypeInfo;

    /// Qualified type name.
    fn type_name() -> &'static str {
        Self::type_info().name
    }
}

/// Metadata source backed by static [`TypeInfo`]s.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    types: HashMap<&'static str, &'static TypeInfo>,
}

impl StaticSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type.
    pub fn register<E: Entity>(mut self) -> Self {
        self.add(E::type_info());
        self
    }

    /// Register a static description directly.
    pub fn add(&mut self, info: &'static TypeInfo) {
        self.types.insert(info.name, info);
    }
}

impl MetadataSource for StaticSource {
    fn type_def(&self, name: &str) -> Option<TypeDef> {
        self.types.get(name).map(|info| TypeDef::from(*info))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Static
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Cardinality, LinkTable, ValueType};

    struct Article;

    impl Entity for Article {
        fn type_info() -> &'static TypeInfo {
            const FIELDS: &[FieldInfo] = &[
                FieldInfo::value("id", ValueType::BigInt).id(),
                FieldInfo::named("tags", "blog::Tag")
                    .list()
                    .link_table(LinkTable::new("article_tag")),
            ];
            static INFO: TypeInfo = TypeInfo::new("blog::Article")
                .table_in("blog", "article")
                .fields(FIELDS)
                .joins(&["LEFT JOIN visit ON visit.article_id = {this}.id"]);
            &INFO
        }
    }

    #[test]
    fn test_static_source_converts_to_type_def() {
        let source = StaticSource::new().register::<Article>();
        let def = source.type_def("blog::Article").unwrap();

        assert_eq!(def.name, "blog::Article");
        let table = def.table.unwrap();
        assert_eq!(table.schema.as_deref(), Some("blog"));
        assert_eq!(table.name, "article");
        assert_eq!(def.fields.len(), 2);
        assert_eq!(def.fields[1].ty, FieldType::Named("blog::Tag".to_string()));
        assert_eq!(def.fields[1].cardinality, Cardinality::List);
        assert_eq!(
            def.fields[1]
                .attrs
                .link
                .as_ref()
                .map(|l| l.table.name.as_str()),
            Some("article_tag")
        );
        assert_eq!(def.joins.len(), 1);
        assert_eq!(source.kind(), SourceKind::Static);
        assert!(source.type_def("blog::Missing").is_none());
    }

    #[test]
    fn test_enum_type_info() {
        static COLOR: TypeInfo = TypeInfo::new("Color").enumeration(&["RED", "BLUE"]);
        let def = TypeDef::from(&COLOR);
        assert!(def.is_enum);
        assert_eq!(def.enum_constants, vec!["RED", "BLUE"]);
        assert_eq!(Article::type_name(), "blog::Article");
    }
}
