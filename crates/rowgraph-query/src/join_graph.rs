//! Join-graph construction.
//!
//! Walks a declared type depth first, in field declaration order and ancestors
//! before subclasses, producing the alias tree, the select list and the
//! materialization plan in one pass.
//!
//! Alias paths: the root is addressed by its table name; every relation adds
//! its field name to the path of the entity it hangs off (the root contributes
//! nothing, so a root relation `department` is addressed as `department`).
//! Embedded value objects contribute their field name to the paths of
//! relations nested inside them but never get an alias themselves. Extra
//! inheritance levels are addressed as `<entity path>.<table>` and link tables
//! as `<relation path>_link`.

use std::collections::HashSet;
use std::sync::Arc;

use rowgraph_core::{
    Catalog, ConfigError, ConfigErrorKind, Entity, FieldClass, FieldDescriptor, Result,
    TypeDescriptor,
};

use crate::alias::{
    Alias, AliasRole, ColumnMapping, ColumnRef, DiscriminatorMapping, EmbeddedMapping,
    EntityMapping, JoinCondition, JoinGraph, JoinType, LevelMapping, Members, RelationKind,
    RelationMapping, Restriction, SelectExpr, SqlField, SqlJoin,
};
use crate::inheritance::{self, LevelRole, TableMapping};
use crate::markers;

/// Build the join graph of a type known to the catalog.
#[tracing::instrument(level = "debug", skip(catalog))]
pub fn build(catalog: &Catalog, type_name: &str) -> Result<JoinGraph> {
    let declared = catalog.describe(type_name)?;
    JoinGraphBuilder::new(catalog).build(&declared)
}

/// Build the join graph of a static entity.
pub fn build_entity<E: Entity>(catalog: &Catalog) -> Result<JoinGraph> {
    build(catalog, E::type_name())
}

struct ParentLink {
    parent: String,
    field: Arc<FieldDescriptor>,
    kind: RelationKind,
    join: SqlJoin,
}

/// Where the fields currently being walked live.
#[derive(Clone)]
struct Scope<'s> {
    entity_path: &'s str,
    level_alias: &'s str,
    owner_table: &'s str,
    owner_ids: &'s [Arc<FieldDescriptor>],
    label_base: String,
    field_base: String,
    column_prefix: String,
    relation_base: String,
}

/// Incremental builder behind [`build`].
pub struct JoinGraphBuilder<'a> {
    catalog: &'a Catalog,
    graph: JoinGraph,
    labels: HashSet<String>,
    stack: Vec<String>,
    deferred_joins: Vec<String>,
    deferred_group: Vec<String>,
}

impl<'a> JoinGraphBuilder<'a> {
    /// Create a builder reading metadata from `catalog`.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            graph: JoinGraph::default(),
            labels: HashSet::new(),
            stack: Vec::new(),
            deferred_joins: Vec::new(),
            deferred_group: Vec::new(),
        }
    }

    /// Walk `declared` and return the finished graph.
    pub fn build(mut self, declared: &Arc<TypeDescriptor>) -> Result<JoinGraph> {
        let mapping = inheritance::resolve(self.catalog, declared)?;
        let root_path = mapping.main_table().name.clone();
        self.add_entity(&root_path, "", mapping, None)?;

        self.graph.extra_joins = std::mem::take(&mut self.deferred_joins);
        self.graph.group_by.extend(
            std::mem::take(&mut self.deferred_group)
                .into_iter()
                .map(SelectExpr::Raw),
        );

        tracing::debug!(
            type_name = %declared.name,
            aliases = self.graph.aliases.len(),
            columns = self.graph.select.len(),
            "Built join graph"
        );
        Ok(self.graph)
    }

    fn add_entity(
        &mut self,
        path: &str,
        relation_base: &str,
        mapping: TableMapping,
        parent: Option<ParentLink>,
    ) -> Result<usize> {
        let declared = Arc::clone(&mapping.declared);
        let ids = declared.id_fields();
        if mapping.levels.len() > 1 && ids.is_empty() {
            return Err(ConfigError::new(
                ConfigErrorKind::MissingKey,
                "inheritance levels are joined on the primary key, but none is declared",
            )
            .for_type(&declared.name)
            .into());
        }

        let is_root = parent.is_none();
        let main = mapping.main_level();
        let level_paths: Vec<String> = mapping
            .levels
            .iter()
            .enumerate()
            .map(|(i, level)| {
                if i == main {
                    path.to_string()
                } else {
                    format!("{path}.{}", level.table.name)
                }
            })
            .collect();

        let restriction = mapping.discriminator.as_ref().and_then(|d| {
            d.restrict_to.as_ref().map(|values| Restriction {
                column: ColumnRef::new(path, &d.column),
                values: values.clone(),
            })
        });

        let (parent_path, field, kind, join) = match parent {
            Some(link) => {
                let mut join = link.join;
                join.restriction = restriction;
                (Some(link.parent), Some(link.field), Some(link.kind), Some(join))
            }
            None => {
                self.graph.restriction = restriction;
                (None, None, None, None)
            }
        };
        self.push_alias(Alias {
            path: path.to_string(),
            parent: parent_path,
            field,
            kind,
            result_type: Some(Arc::clone(&declared)),
            table: mapping.levels[main].table.clone(),
            role: AliasRole::Entity,
            join,
            columns: Vec::new(),
            levels: level_paths
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != main)
                .map(|(_, p)| p.clone())
                .collect(),
        })?;

        for (i, level) in mapping.levels.iter().enumerate() {
            if i == main {
                continue;
            }
            let join_type = match level.role {
                LevelRole::Ancestor if is_root => JoinType::Inner,
                _ => JoinType::Left,
            };
            let condition = JoinCondition::Columns(
                ids.iter()
                    .map(|id| {
                        (
                            ColumnRef::new(&level_paths[i], &id.column),
                            ColumnRef::new(path, &id.column),
                        )
                    })
                    .collect(),
            );
            self.push_alias(Alias {
                path: level_paths[i].clone(),
                parent: Some(path.to_string()),
                field: None,
                kind: None,
                result_type: Some(Arc::clone(&level.owner)),
                table: level.table.clone(),
                role: AliasRole::Level,
                join: Some(SqlJoin {
                    join_type,
                    condition,
                    restriction: None,
                }),
                columns: Vec::new(),
                levels: Vec::new(),
            })?;
        }

        let discriminator = match &mapping.discriminator {
            Some(d) => {
                let label = format!("{path}.{}", d.column);
                self.select(
                    SelectExpr::Column(ColumnRef::new(path, &d.column)),
                    label.clone(),
                );
                Some(DiscriminatorMapping {
                    label,
                    fallback: Arc::clone(&declared),
                    candidates: d.candidates.clone(),
                })
            }
            None => None,
        };

        let entity = self.graph.entities.len();
        self.graph.entities.push(EntityMapping {
            path: path.to_string(),
            declared: Arc::clone(&declared),
            strategy: mapping.strategy,
            levels: Vec::new(),
            main_level: main,
            discriminator,
            members: Members::default(),
        });

        self.stack.push(declared.name.clone());
        for (i, level) in mapping.levels.iter().enumerate() {
            let alias = level_paths[i].as_str();
            let key_labels = ids
                .iter()
                .map(|id| {
                    let label = format!("{alias}.{}", id.name);
                    self.select(
                        SelectExpr::Column(ColumnRef::new(alias, &id.column)),
                        label.clone(),
                    );
                    self.register_column(alias, &id.name, &id.column);
                    label
                })
                .collect();
            self.graph.entities[entity].levels.push(LevelMapping {
                alias: alias.to_string(),
                owner: Arc::clone(&level.owner),
                role: level.role,
                key_labels,
            });

            let scope = Scope {
                entity_path: path,
                level_alias: alias,
                owner_table: &level.table.name,
                owner_ids: &ids,
                label_base: alias.to_string(),
                field_base: String::new(),
                column_prefix: String::new(),
                relation_base: relation_base.to_string(),
            };
            let members = self.members(&scope, &level.fields)?;
            self.graph.entities[entity].add_members(members);
        }
        self.stack.pop();

        for ty in declared.lineage() {
            for join in &ty.joins {
                self.deferred_joins
                    .push(markers::rebase(join, &[("this", path)])?);
            }
            for group in &ty.group_by {
                self.deferred_group
                    .push(markers::rebase(group, &[("this", path)])?);
            }
        }
        Ok(entity)
    }

    fn members(&mut self, scope: &Scope<'_>, fields: &[Arc<FieldDescriptor>]) -> Result<Members> {
        let mut members = Members::default();
        for field in fields.iter().filter(|f| !f.transient) {
            match field.class {
                FieldClass::Scalar(_) | FieldClass::Enum => {
                    members.columns.push(self.scalar(scope, field)?);
                }
                FieldClass::Embedded => {
                    members.embedded.push(self.embedded(scope, field)?);
                }
                FieldClass::Relation => {
                    members.relations.push(self.relation(scope, field)?);
                }
            }
        }
        Ok(members)
    }

    fn scalar(&mut self, scope: &Scope<'_>, field: &Arc<FieldDescriptor>) -> Result<ColumnMapping> {
        let label = format!("{}.{}", scope.label_base, field.name);
        let is_key = field.id && scope.column_prefix.is_empty() && field.sql.is_none();
        if is_key {
            // Already selected with the level's key columns.
            if field.group_by {
                self.graph.group_by.push(SelectExpr::Column(ColumnRef::new(
                    scope.level_alias,
                    &field.column,
                )));
            }
            return Ok(ColumnMapping {
                field: Arc::clone(field),
                label,
            });
        }

        let expression = match &field.sql {
            Some(sql) => SelectExpr::Raw(markers::rebase(sql, &[("this", scope.entity_path)])?),
            None => {
                let column = format!("{}{}", scope.column_prefix, field.column);
                let field_path = format!("{}{}", scope.field_base, field.name);
                self.register_column(scope.level_alias, &field_path, &column);
                SelectExpr::Column(ColumnRef::new(scope.level_alias, column))
            }
        };
        if field.group_by {
            self.graph.group_by.push(expression.clone());
        }
        self.select(expression, label.clone());
        Ok(ColumnMapping {
            field: Arc::clone(field),
            label,
        })
    }

    fn embedded(
        &mut self,
        scope: &Scope<'_>,
        field: &Arc<FieldDescriptor>,
    ) -> Result<EmbeddedMapping> {
        let target = self.target_of(field)?;
        self.enter(scope, field, &target)?;
        let nested = Scope {
            label_base: format!("{}.{}", scope.label_base, field.name),
            field_base: format!("{}{}.", scope.field_base, field.name),
            column_prefix: format!("{}{}", scope.column_prefix, field.embed_prefix()),
            relation_base: join_path(&scope.relation_base, &field.name),
            ..scope.clone()
        };
        let members = self.members(&nested, &target.fields(true));
        self.stack.pop();
        Ok(EmbeddedMapping {
            field: Arc::clone(field),
            target,
            members: members?,
        })
    }

    fn relation(
        &mut self,
        scope: &Scope<'_>,
        field: &Arc<FieldDescriptor>,
    ) -> Result<RelationMapping> {
        let target = self.target_of(field)?;
        if self.stack.iter().any(|t| *t == target.name) {
            return Err(cyclic(scope, field, &target));
        }
        let mapping = inheritance::resolve(self.catalog, &target)?;
        let child_path = join_path(&scope.relation_base, &field.name);
        let kind = if !field.cardinality.is_many() {
            RelationKind::ToOne
        } else if field.link.is_some() {
            RelationKind::ToManyLinked
        } else {
            RelationKind::ToManyDirect
        };
        let target_ids = target.id_fields();
        let link_path = format!("{child_path}_link");

        if let Some(link) = field.link.as_ref().filter(|_| kind == RelationKind::ToManyLinked) {
            let owner_id = single_key(&field.owner, scope.owner_ids)?;
            let owner_column = link
                .owner_column
                .clone()
                .unwrap_or_else(|| format!("{}_id", scope.owner_table));
            self.push_alias(Alias {
                path: link_path.clone(),
                parent: Some(scope.level_alias.to_string()),
                field: Some(Arc::clone(field)),
                kind: Some(kind),
                result_type: None,
                table: link.table.clone(),
                role: AliasRole::Link,
                join: Some(SqlJoin {
                    join_type: JoinType::Left,
                    condition: JoinCondition::Columns(vec![(
                        ColumnRef::new(&link_path, owner_column),
                        ColumnRef::new(scope.level_alias, &owner_id.column),
                    )]),
                    restriction: None,
                }),
                columns: Vec::new(),
                levels: Vec::new(),
            })?;
        }

        let condition = match &field.join_condition {
            Some(custom) => JoinCondition::Raw(markers::rebase(
                custom,
                &[
                    ("this", scope.entity_path),
                    ("linktable", link_path.as_str()),
                    (field.name.as_str(), child_path.as_str()),
                ],
            )?),
            None => match kind {
                RelationKind::ToOne => {
                    let target_id = single_key(&target.name, &target_ids)?;
                    let fk = field
                        .join_column
                        .clone()
                        .unwrap_or_else(|| format!("{}_id", field.name));
                    JoinCondition::Columns(vec![(
                        ColumnRef::new(&child_path, &target_id.column),
                        ColumnRef::new(scope.level_alias, format!("{}{fk}", scope.column_prefix)),
                    )])
                }
                RelationKind::ToManyDirect => {
                    let owner_id = single_key(&field.owner, scope.owner_ids)?;
                    let fk = field
                        .join_column
                        .clone()
                        .unwrap_or_else(|| format!("{}_id", scope.owner_table));
                    JoinCondition::Columns(vec![(
                        ColumnRef::new(&child_path, fk),
                        ColumnRef::new(scope.level_alias, &owner_id.column),
                    )])
                }
                RelationKind::ToManyLinked | RelationKind::Embedded => {
                    let target_id = single_key(&target.name, &target_ids)?;
                    let target_column = field
                        .link
                        .as_ref()
                        .and_then(|l| l.target_column.clone())
                        .unwrap_or_else(|| format!("{}_id", mapping.main_table().name));
                    JoinCondition::Columns(vec![(
                        ColumnRef::new(&child_path, &target_id.column),
                        ColumnRef::new(&link_path, target_column),
                    )])
                }
            },
        };

        let parent = if kind == RelationKind::ToManyLinked {
            link_path
        } else {
            scope.level_alias.to_string()
        };
        let child_base = child_path.clone();
        let child = self.add_entity(
            &child_path,
            &child_base,
            mapping,
            Some(ParentLink {
                parent,
                field: Arc::clone(field),
                kind,
                join: SqlJoin {
                    join_type: JoinType::Left,
                    condition,
                    restriction: None,
                },
            }),
        )?;
        Ok(RelationMapping {
            field: Arc::clone(field),
            kind,
            child,
        })
    }

    fn target_of(&self, field: &FieldDescriptor) -> Result<Arc<TypeDescriptor>> {
        let Some(name) = field.target_type() else {
            return Err(ConfigError::new(
                ConfigErrorKind::InvalidDefinition,
                format!("field {} does not name a type", field.name),
            )
            .for_type(&field.owner)
            .into());
        };
        self.catalog.describe(name)
    }

    fn enter(
        &mut self,
        scope: &Scope<'_>,
        field: &FieldDescriptor,
        target: &TypeDescriptor,
    ) -> Result<()> {
        if self.stack.iter().any(|t| *t == target.name) {
            return Err(cyclic(scope, field, target));
        }
        self.stack.push(target.name.clone());
        Ok(())
    }

    fn push_alias(&mut self, alias: Alias) -> Result<()> {
        if self.graph.index.contains_key(&alias.path) {
            return Err(ConfigError::new(
                ConfigErrorKind::DuplicateAlias,
                format!("alias path {} is produced twice", alias.path),
            )
            .into());
        }
        tracing::trace!(
            path = %alias.path,
            table = %alias.table.name,
            role = ?alias.role,
            kind = ?alias.kind,
            "Registered alias"
        );
        self.graph
            .index
            .insert(alias.path.clone(), self.graph.aliases.len());
        self.graph.aliases.push(alias);
        Ok(())
    }

    fn register_column(&mut self, alias: &str, field_path: &str, column: &str) {
        if let Some(&i) = self.graph.index.get(alias) {
            let columns = &mut self.graph.aliases[i].columns;
            if !columns.iter().any(|(f, _)| f == field_path) {
                columns.push((field_path.to_string(), column.to_string()));
            }
        }
    }

    fn select(&mut self, expression: SelectExpr, label: String) {
        if self.labels.insert(label.clone()) {
            self.graph.select.push(SqlField { expression, label });
        }
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

fn single_key<'f>(
    type_name: &str,
    ids: &'f [Arc<FieldDescriptor>],
) -> Result<&'f Arc<FieldDescriptor>> {
    match ids {
        [id] => Ok(id),
        _ => Err(ConfigError::new(
            ConfigErrorKind::MissingKey,
            format!(
                "cannot infer a join: {type_name} has {} id fields, exactly one is required \
                 (declare a join condition instead)",
                ids.len()
            ),
        )
        .for_type(type_name)
        .into()),
    }
}

fn cyclic(
    scope: &Scope<'_>,
    field: &FieldDescriptor,
    target: &TypeDescriptor,
) -> rowgraph_core::Error {
    ConfigError::new(
        ConfigErrorKind::CyclicRelation,
        format!(
            "{}.{} at {} leads back to {}, which is already being walked",
            field.owner, field.name, scope.entity_path, target.name
        ),
    )
    .for_type(&field.owner)
    .into()
}
