//! The compiled join graph.
//!
//! A [`JoinGraph`] is the single structure shared by rendering and
//! materialization. Every joined table is an [`Alias`] addressed by its dotted
//! path; select columns are labelled `"<alias path>.<field>"`, and the
//! [`EntityMapping`]s tell the materializer which labels belong to which
//! object.

use std::collections::HashMap;
use std::sync::Arc;

use rowgraph_core::{FieldDescriptor, InheritanceStrategy, TableName, TypeDescriptor};

use crate::inheritance::LevelRole;

/// How a relation reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Singular reference; foreign key on the owner.
    ToOne,
    /// Collection; foreign key on the target.
    ToManyDirect,
    /// Collection through a link table.
    ToManyLinked,
    /// Value object flattened into the owner's columns.
    Embedded,
}

impl RelationKind {
    /// Check if the relation yields a collection.
    pub const fn is_many(&self) -> bool {
        matches!(self, RelationKind::ToManyDirect | RelationKind::ToManyLinked)
    }
}

/// SQL join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN
    Inner,
    /// LEFT JOIN
    Left,
}

impl JoinType {
    /// The SQL keyword.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// What an alias stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasRole {
    /// The main table of an entity.
    Entity,
    /// An extra inheritance level of an entity.
    Level,
    /// The link table of a many-to-many relation.
    Link,
}

/// A column of an aliased table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Alias path.
    pub alias: String,
    /// Physical column name.
    pub column: String,
}

impl ColumnRef {
    /// Create a column reference.
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

/// Rows of an alias limited to some discriminator values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    /// Discriminator column.
    pub column: ColumnRef,
    /// Allowed registered names.
    pub values: Vec<String>,
}

/// ON clause of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinCondition {
    /// Conjunction of column equalities.
    Columns(Vec<(ColumnRef, ColumnRef)>),
    /// Caller-supplied SQL containing `{path}` markers.
    Raw(String),
}

/// How an alias is joined to the rest of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlJoin {
    /// Join type.
    pub join_type: JoinType,
    /// ON clause.
    pub condition: JoinCondition,
    /// Extra discriminator restriction ANDed to the ON clause.
    pub restriction: Option<Restriction>,
}

/// A node of the join tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    /// Dotted alias path; unique within a graph.
    pub path: String,
    /// Parent alias path; `None` for the root.
    pub parent: Option<String>,
    /// Relation field that produced this alias.
    pub field: Option<Arc<FieldDescriptor>>,
    /// Relation kind; `None` for the root and for level aliases.
    pub kind: Option<RelationKind>,
    /// Type of the rows this alias yields; `None` for link tables.
    pub result_type: Option<Arc<TypeDescriptor>>,
    /// Physical table.
    pub table: TableName,
    /// What the alias stands for.
    pub role: AliasRole,
    /// Join to the parent; `None` for the root.
    pub join: Option<SqlJoin>,
    /// Field path to physical column, for columns stored in this table.
    pub columns: Vec<(String, String)>,
    /// Other level aliases of the same entity, searched when a column is not
    /// found here.
    pub levels: Vec<String>,
}

impl Alias {
    /// Physical column of a field path stored in this table.
    pub fn column(&self, field_path: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(f, _)| f == field_path)
            .map(|(_, c)| c.as_str())
    }
}

/// A select list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectExpr {
    /// A column reference.
    Column(ColumnRef),
    /// Raw SQL containing `{path}` markers.
    Raw(String),
}

/// A select expression with its output label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlField {
    /// What is selected.
    pub expression: SelectExpr,
    /// Output label, `"<alias path>.<field>"`.
    pub label: String,
}

/// A scalar field read from one labelled column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    /// The field populated.
    pub field: Arc<FieldDescriptor>,
    /// Result column label.
    pub label: String,
}

/// An embedded value object.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedMapping {
    /// The embedding field.
    pub field: Arc<FieldDescriptor>,
    /// The value object type.
    pub target: Arc<TypeDescriptor>,
    /// Members flattened from the value object.
    pub members: Members,
}

/// A relation to another entity of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationMapping {
    /// The relation field.
    pub field: Arc<FieldDescriptor>,
    /// Relation kind.
    pub kind: RelationKind,
    /// Index of the target in [`JoinGraph::entities`].
    pub child: usize,
}

/// What an object (entity or value object) is populated from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Members {
    /// Scalar fields.
    pub columns: Vec<ColumnMapping>,
    /// Embedded value objects.
    pub embedded: Vec<EmbeddedMapping>,
    /// Relations.
    pub relations: Vec<RelationMapping>,
}

impl Members {
    fn append(&mut self, other: Members) {
        self.columns.extend(other.columns);
        self.embedded.extend(other.embedded);
        self.relations.extend(other.relations);
    }

    /// Labels of every scalar column, embedded ones included.
    pub fn all_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.columns.iter().map(|c| c.label.as_str()).collect();
        for e in &self.embedded {
            labels.extend(e.members.all_labels());
        }
        labels
    }
}

/// One inheritance level of an entity, as seen by the materializer.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelMapping {
    /// Level alias path.
    pub alias: String,
    /// Type declaring the level's table.
    pub owner: Arc<TypeDescriptor>,
    /// Ancestor or subclass level.
    pub role: LevelRole,
    /// Labels of the level's key columns.
    pub key_labels: Vec<String>,
}

/// Subtype selection of a single-table hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatorMapping {
    /// Label of the discriminator column.
    pub label: String,
    /// Type used when the value matches no candidate.
    pub fallback: Arc<TypeDescriptor>,
    /// Concrete types by registered name.
    pub candidates: Vec<Arc<TypeDescriptor>>,
}

/// How to build the objects of one entity alias.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    /// Entity alias path.
    pub path: String,
    /// Declared type.
    pub declared: Arc<TypeDescriptor>,
    /// Inheritance strategy of the declared type.
    pub strategy: InheritanceStrategy,
    /// Table levels, ancestors first then subclasses.
    pub levels: Vec<LevelMapping>,
    /// Index of the declared type's own level.
    pub main_level: usize,
    /// Discriminator selection for single-table hierarchies.
    pub discriminator: Option<DiscriminatorMapping>,
    /// Members across every level.
    pub members: Members,
}

impl EntityMapping {
    /// Labels of the identity columns.
    pub fn key_labels(&self) -> &[String] {
        &self.levels[self.main_level].key_labels
    }

    pub(crate) fn add_members(&mut self, members: Members) {
        self.members.append(members);
    }
}

/// The compiled join graph of one declared shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinGraph {
    /// Aliases in join order; the first is the root.
    pub aliases: Vec<Alias>,
    /// Select list in output order.
    pub select: Vec<SqlField>,
    /// Raw joins declared on types, appended after generated joins.
    pub extra_joins: Vec<String>,
    /// GROUP BY terms from fields and types.
    pub group_by: Vec<SelectExpr>,
    /// Discriminator restriction of the root.
    pub restriction: Option<Restriction>,
    /// Object construction plans; the first is the root.
    pub entities: Vec<EntityMapping>,
    pub(crate) index: HashMap<String, usize>,
}

impl JoinGraph {
    /// The root alias.
    pub fn root(&self) -> Option<&Alias> {
        self.aliases.first()
    }

    /// The root entity plan.
    pub fn root_entity(&self) -> Option<&EntityMapping> {
        self.entities.first()
    }

    /// Look up an alias by path.
    pub fn alias(&self, path: &str) -> Option<&Alias> {
        self.index.get(path).map(|&i| &self.aliases[i])
    }

    /// Resolve a marker name (`path` or `path.field`) to an alias path and
    /// optional physical column.
    ///
    /// The longest alias prefix wins. A field path is looked up in that
    /// alias's columns, then in its entity's other levels; a single unknown
    /// segment is taken as a literal column name.
    pub fn resolve_marker(&self, name: &str) -> Option<(String, Option<String>)> {
        if self.index.contains_key(name) {
            return Some((name.to_string(), None));
        }
        for (dot, _) in name.rmatch_indices('.') {
            let (prefix, rest) = (&name[..dot], &name[dot + 1..]);
            let Some(alias) = self.alias(prefix) else {
                continue;
            };
            if let Some(column) = alias.column(rest) {
                return Some((prefix.to_string(), Some(column.to_string())));
            }
            for level in &alias.levels {
                if let Some(column) = self.alias(level).and_then(|a| a.column(rest)) {
                    return Some((level.clone(), Some(column.to_string())));
                }
            }
            if rest.contains('.') {
                return None;
            }
            return Some((prefix.to_string(), Some(rest.to_string())));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(path: &str, columns: &[(&str, &str)], levels: &[&str]) -> Alias {
        Alias {
            path: path.to_string(),
            parent: None,
            field: None,
            kind: None,
            result_type: None,
            table: TableName {
                schema: None,
                name: path.to_string(),
            },
            role: AliasRole::Entity,
            join: None,
            columns: columns
                .iter()
                .map(|(f, c)| ((*f).to_string(), (*c).to_string()))
                .collect(),
            levels: levels.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    fn graph(aliases: Vec<Alias>) -> JoinGraph {
        let index = aliases
            .iter()
            .enumerate()
            .map(|(i, a)| (a.path.clone(), i))
            .collect();
        JoinGraph {
            aliases,
            index,
            ..JoinGraph::default()
        }
    }

    #[test]
    fn test_resolve_marker_alias_and_columns() {
        let g = graph(vec![
            alias("employee", &[("salary", "salary")], &["employee.person"]),
            alias("employee.person", &[("name", "full_name")], &[]),
            alias(
                "employee.personal.home.country",
                &[("code", "iso_code")],
                &[],
            ),
        ]);

        assert_eq!(g.resolve_marker("employee"), Some(("employee".into(), None)));
        assert_eq!(
            g.resolve_marker("employee.salary"),
            Some(("employee".into(), Some("salary".into())))
        );
        // inherited column lives on the ancestor level
        assert_eq!(
            g.resolve_marker("employee.name"),
            Some(("employee.person".into(), Some("full_name".into())))
        );
        // literal column fallback
        assert_eq!(
            g.resolve_marker("employee.kind"),
            Some(("employee".into(), Some("kind".into())))
        );
        assert_eq!(
            g.resolve_marker("employee.personal.home.country.code"),
            Some((
                "employee.personal.home.country".into(),
                Some("iso_code".into())
            ))
        );
        assert_eq!(g.resolve_marker("nowhere"), None);
        assert_eq!(g.resolve_marker("nowhere.id"), None);
    }

    #[test]
    fn test_embedded_field_path_lookup() {
        let g = graph(vec![alias(
            "person",
            &[("personal.city", "personal_city")],
            &[],
        )]);
        assert_eq!(
            g.resolve_marker("person.personal.city"),
            Some(("person".into(), Some("personal_city".into())))
        );
        assert_eq!(g.resolve_marker("person.personal.zip"), None);
    }
}
