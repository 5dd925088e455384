//! Table and inheritance resolution.
//!
//! Walks a type's ancestry (and, for polymorphic queries, its registered
//! descendants) to decide which physical tables hold its rows and how they
//! relate. The result is a [`TableMapping`] tagged with one
//! [`InheritanceStrategy`], resolved once per hierarchy so the builder and the
//! materializer never branch on type hierarchies themselves.

use std::sync::Arc;

use rowgraph_core::{
    Catalog, ConfigError, ConfigErrorKind, FieldDescriptor, InheritanceStrategy, Result, TableName,
    TypeDescriptor,
};

/// Whether a binding belongs to the queried type's ancestry or to a subclass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelRole {
    /// The queried type or one of its ancestors; always present for a row.
    Ancestor,
    /// A registered subclass; present only for rows of that subclass.
    Subclass,
}

/// One physical table holding one level of a hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBinding {
    /// Physical table.
    pub table: TableName,
    /// The type declaring the table.
    pub owner: Arc<TypeDescriptor>,
    /// Fields stored in this table, in declaration order.
    pub fields: Vec<Arc<FieldDescriptor>>,
    /// Ancestor or subclass level.
    pub role: LevelRole,
}

/// A discriminated single-table hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatorInfo {
    /// Discriminator column.
    pub column: String,
    /// The type declaring the discriminator.
    pub base: Arc<TypeDescriptor>,
    /// Concrete types a row may hold: the queried type then its descendants.
    pub candidates: Vec<Arc<TypeDescriptor>>,
    /// Registered names rows are restricted to, when the queried type is
    /// not the base.
    pub restrict_to: Option<Vec<String>>,
}

impl DiscriminatorInfo {
    /// The candidate registered under `name`.
    pub fn candidate(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.candidates.iter().find(|t| t.registered_name() == name)
    }
}

/// Tables holding one queried type.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMapping {
    /// The queried type.
    pub declared: Arc<TypeDescriptor>,
    /// Resolved strategy.
    pub strategy: InheritanceStrategy,
    /// Ancestor levels root-most first, then subclass levels depth first.
    pub levels: Vec<TableBinding>,
    /// Discriminator details for single-table hierarchies.
    pub discriminator: Option<DiscriminatorInfo>,
}

impl TableMapping {
    /// Index of the queried type's own (most specific ancestor) level.
    pub fn main_level(&self) -> usize {
        self.levels
            .iter()
            .rposition(|l| l.role == LevelRole::Ancestor)
            .unwrap_or(0)
    }

    /// The queried type's own table.
    pub fn main_table(&self) -> &TableName {
        &self.levels[self.main_level()].table
    }
}

/// Resolve the tables holding `declared`.
#[tracing::instrument(level = "debug", skip(catalog, declared), fields(type_name = %declared.name))]
pub fn resolve(catalog: &Catalog, declared: &Arc<TypeDescriptor>) -> Result<TableMapping> {
    if !declared.has_table_mapping() {
        return Err(ConfigError::new(
            ConfigErrorKind::MissingTable,
            "no table declared anywhere in the type's ancestry",
        )
        .for_type(&declared.name)
        .into());
    }

    let lineage = lineage_arcs(declared);
    if let Some(base) = lineage.iter().find(|t| t.discriminator.is_some()) {
        return resolve_discriminated(catalog, declared, &lineage, base);
    }

    let mut levels = ancestor_levels(&lineage);
    for sub in catalog.descendants(declared)? {
        // Without a table or a discriminator the subtype could never be told apart.
        let Some(table) = &sub.table else {
            return Err(ConfigError::new(
                ConfigErrorKind::MissingTable,
                format!(
                    "subclass {} of {} has neither its own table nor a discriminator",
                    sub.name, declared.name
                ),
            )
            .for_type(&sub.name)
            .into());
        };
        levels.push(TableBinding {
            table: table.clone(),
            owner: Arc::clone(&sub),
            fields: sub.fields.clone(),
            role: LevelRole::Subclass,
        });
    }

    let strategy = if levels.len() > 1 {
        InheritanceStrategy::Vertical
    } else {
        InheritanceStrategy::None
    };
    tracing::debug!(strategy = ?strategy, levels = levels.len(), "Resolved tables");

    Ok(TableMapping {
        declared: Arc::clone(declared),
        strategy,
        levels,
        discriminator: None,
    })
}

fn resolve_discriminated(
    catalog: &Catalog,
    declared: &Arc<TypeDescriptor>,
    lineage: &[Arc<TypeDescriptor>],
    base: &Arc<TypeDescriptor>,
) -> Result<TableMapping> {
    let column = base.discriminator.clone().unwrap_or_default();
    let is_base = Arc::ptr_eq(base, declared) || base.name == declared.name;

    if !is_base && !catalog.descendants(base)?.iter().any(|t| t.name == declared.name) {
        return Err(ConfigError::new(
            ConfigErrorKind::UnregisteredSubtype,
            format!(
                "{} is not registered under the inheritance group of {}",
                declared.name, base.name
            ),
        )
        .for_type(&declared.name)
        .into());
    }

    let descendants = catalog.descendants(declared)?;
    let mut candidates = vec![Arc::clone(declared)];
    candidates.extend(descendants.iter().cloned());

    let Some((owner, table)) = lineage
        .iter()
        .rev()
        .find_map(|t| t.table.clone().map(|table| (t, table)))
    else {
        return Err(ConfigError::new(ConfigErrorKind::MissingTable, "no table binding")
            .for_type(&declared.name)
            .into());
    };
    // The union of every candidate's fields lives in the one table.
    let levels = vec![TableBinding {
        table,
        owner: Arc::clone(owner),
        fields: lineage
            .iter()
            .chain(descendants.iter())
            .flat_map(|t| t.fields.iter().cloned())
            .collect(),
        role: LevelRole::Ancestor,
    }];

    let restrict_to = (!is_base).then(|| {
        candidates
            .iter()
            .map(|t| t.registered_name().to_string())
            .collect()
    });

    tracing::debug!(
        base = %base.name,
        column = %column,
        candidates = candidates.len(),
        "Resolved discriminated hierarchy"
    );

    Ok(TableMapping {
        declared: Arc::clone(declared),
        strategy: InheritanceStrategy::Discriminated,
        levels,
        discriminator: Some(DiscriminatorInfo {
            column,
            base: Arc::clone(base),
            candidates,
            restrict_to,
        }),
    })
}

/// The ancestry as shared descriptors, root-most first.
fn lineage_arcs(declared: &Arc<TypeDescriptor>) -> Vec<Arc<TypeDescriptor>> {
    let mut chain = vec![Arc::clone(declared)];
    let mut current = declared.superclass.clone();
    while let Some(parent) = current {
        current = parent.superclass.clone();
        chain.push(parent);
    }
    chain.reverse();
    chain
}

/// One binding per ancestor carrying a table. Fields of table-less types go to
/// the next table below them, or to the last table if none follows.
fn ancestor_levels(lineage: &[Arc<TypeDescriptor>]) -> Vec<TableBinding> {
    let mut levels: Vec<TableBinding> = Vec::new();
    let mut pending: Vec<Arc<FieldDescriptor>> = Vec::new();
    for ty in lineage {
        pending.extend(ty.fields.iter().cloned());
        if let Some(table) = &ty.table {
            levels.push(TableBinding {
                table: table.clone(),
                owner: Arc::clone(ty),
                fields: std::mem::take(&mut pending),
                role: LevelRole::Ancestor,
            });
        }
    }
    if let Some(last) = levels.last_mut() {
        last.fields.extend(pending);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{DynamicSource, Error, FieldDef, TypeDef, ValueType};

    fn kind_of(err: Error) -> ConfigErrorKind {
        match err {
            Error::Config(c) => c.kind,
            other => panic!("expected config error, got {other}"),
        }
    }

    fn people() -> Catalog {
        Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Person")
                        .table("person")
                        .subclass("Employee")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::value("name", ValueType::Text)),
                )
                .with(
                    TypeDef::new("Employee")
                        .table("employee")
                        .superclass("Person")
                        .subclass("Manager")
                        .field(FieldDef::value("salary", ValueType::Double)),
                )
                .with(
                    TypeDef::new("Manager")
                        .table("manager")
                        .superclass("Employee")
                        .field(FieldDef::value("reports", ValueType::Int)),
                ),
        )
    }

    fn rooms() -> Catalog {
        Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Room")
                        .table("room")
                        .discriminator("kind")
                        .subclass("Suite")
                        .subclass("Single")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::value("floor", ValueType::Int)),
                )
                .with(
                    TypeDef::new("Suite")
                        .superclass("Room")
                        .discriminator_value("suite")
                        .subclass("Penthouse")
                        .field(FieldDef::value("rooms", ValueType::Int)),
                )
                .with(
                    TypeDef::new("Penthouse")
                        .superclass("Suite")
                        .field(FieldDef::value("terrace", ValueType::Bool)),
                )
                .with(
                    TypeDef::new("Single")
                        .superclass("Room")
                        .field(FieldDef::value("bed", ValueType::Text)),
                )
                .with(TypeDef::new("Stray").superclass("Room")),
        )
    }

    fn field_names(binding: &TableBinding) -> Vec<&str> {
        binding.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_single_table_is_none_strategy() {
        let catalog = Catalog::new().with_source(DynamicSource::new().with(
            TypeDef::new("Tag")
                .table("tag")
                .field(FieldDef::value("id", ValueType::BigInt).id()),
        ));
        let mapping = resolve(&catalog, &catalog.describe("Tag").unwrap()).unwrap();
        assert_eq!(mapping.strategy, InheritanceStrategy::None);
        assert_eq!(mapping.levels.len(), 1);
        assert_eq!(mapping.main_table().name, "tag");
    }

    #[test]
    fn test_vertical_ancestors_and_subclasses() {
        let catalog = people();
        let employee = catalog.describe("Employee").unwrap();
        let mapping = resolve(&catalog, &employee).unwrap();

        assert_eq!(mapping.strategy, InheritanceStrategy::Vertical);
        let tables: Vec<_> = mapping.levels.iter().map(|l| l.table.name.as_str()).collect();
        assert_eq!(tables, vec!["person", "employee", "manager"]);
        let roles: Vec<_> = mapping.levels.iter().map(|l| l.role).collect();
        assert_eq!(
            roles,
            vec![LevelRole::Ancestor, LevelRole::Ancestor, LevelRole::Subclass]
        );
        assert_eq!(mapping.main_level(), 1);
        assert_eq!(field_names(&mapping.levels[0]), vec!["id", "name"]);
        assert_eq!(field_names(&mapping.levels[1]), vec!["salary"]);
    }

    #[test]
    fn test_tableless_ancestor_fields_fold_into_next_table() {
        let catalog = Catalog::new().with_source(
            DynamicSource::new()
                .with(TypeDef::new("Base").field(FieldDef::value("id", ValueType::BigInt).id()))
                .with(
                    TypeDef::new("Doc")
                        .superclass("Base")
                        .table("doc")
                        .field(FieldDef::value("body", ValueType::Text)),
                ),
        );
        let mapping = resolve(&catalog, &catalog.describe("Doc").unwrap()).unwrap();
        assert_eq!(mapping.strategy, InheritanceStrategy::None);
        assert_eq!(field_names(&mapping.levels[0]), vec!["id", "body"]);
    }

    #[test]
    fn test_discriminated_union_of_fields() {
        let catalog = rooms();
        let mapping = resolve(&catalog, &catalog.describe("Room").unwrap()).unwrap();

        assert_eq!(mapping.strategy, InheritanceStrategy::Discriminated);
        assert_eq!(mapping.levels.len(), 1);
        assert_eq!(
            field_names(&mapping.levels[0]),
            vec!["id", "floor", "rooms", "terrace", "bed"]
        );
        let discr = mapping.discriminator.unwrap();
        assert_eq!(discr.column, "kind");
        assert!(discr.restrict_to.is_none());
        assert_eq!(discr.candidate("suite").unwrap().name, "Suite");
        assert_eq!(discr.candidate("Penthouse").unwrap().name, "Penthouse");
        assert!(discr.candidate("Nope").is_none());
    }

    #[test]
    fn test_discriminated_subtype_restricts_rows() {
        let catalog = rooms();
        let mapping = resolve(&catalog, &catalog.describe("Suite").unwrap()).unwrap();
        let discr = mapping.discriminator.unwrap();
        assert_eq!(
            discr.restrict_to,
            Some(vec!["suite".to_string(), "Penthouse".to_string()])
        );
        assert_eq!(
            field_names(&mapping.levels[0]),
            vec!["id", "floor", "rooms", "terrace"]
        );
    }

    #[test]
    fn test_unregistered_discriminated_subtype() {
        let catalog = rooms();
        let err = resolve(&catalog, &catalog.describe("Stray").unwrap()).unwrap_err();
        assert_eq!(kind_of(err), ConfigErrorKind::UnregisteredSubtype);
    }

    #[test]
    fn test_missing_table() {
        let catalog = Catalog::new().with_source(
            DynamicSource::new()
                .with(TypeDef::new("Loose").field(FieldDef::value("x", ValueType::Int))),
        );
        let err = resolve(&catalog, &catalog.describe("Loose").unwrap()).unwrap_err();
        assert_eq!(kind_of(err), ConfigErrorKind::MissingTable);
    }

    #[test]
    fn test_tableless_vertical_subclass_is_rejected() {
        let catalog = Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Person")
                        .table("person")
                        .subclass("Employee")
                        .field(FieldDef::value("id", ValueType::BigInt).id()),
                )
                .with(
                    TypeDef::new("Employee")
                        .superclass("Person")
                        .field(FieldDef::value("salary", ValueType::Double)),
                ),
        );
        let err = resolve(&catalog, &catalog.describe("Person").unwrap()).unwrap_err();
        let Error::Config(config) = err else {
            panic!("expected a config error, got {err}");
        };
        assert_eq!(config.kind, ConfigErrorKind::MissingTable);
        assert_eq!(config.type_name.as_deref(), Some("Employee"));

        // Queried directly, the subclass folds into its ancestor's table.
        let mapping = resolve(&catalog, &catalog.describe("Employee").unwrap()).unwrap();
        assert_eq!(mapping.strategy, InheritanceStrategy::None);
        assert_eq!(field_names(&mapping.levels[0]), vec!["id", "salary"]);
    }
}
