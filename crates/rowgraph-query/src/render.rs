//! SQL rendering.
//!
//! Turns a [`JoinGraph`] plus caller fragments into one parameterized
//! statement. The statement text is first assembled with `{path}` markers
//! intact, markers are then resolved in a single pass, and finally every
//! parameter marker is rewritten to the dialect's placeholder.

use std::collections::HashMap;

use rowgraph_core::error::config_error;
use rowgraph_core::{ConfigErrorKind, Dialect, Result, Value};

use crate::alias::{ColumnRef, JoinCondition, JoinGraph, Restriction, SelectExpr};
use crate::expr::SqlExpression;
use crate::markers;
use crate::params::{self, ParamMarker};

/// Caller-supplied parts of a statement.
///
/// Fragments may reference any alias of the compiled graph through `{path}`
/// and `{path.field}` markers, and may contain `?` and `:name` parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragments {
    /// WHERE conditions, ANDed together.
    pub filters: Vec<SqlExpression>,
    /// Extra GROUP BY terms.
    pub group_by: Vec<SqlExpression>,
    /// ORDER BY terms.
    pub order_by: Vec<SqlExpression>,
    /// Row limit.
    pub limit: Option<u64>,
    /// Row offset.
    pub offset: Option<u64>,
    /// Values of `:name` parameters.
    pub named: HashMap<String, Value>,
}

impl Fragments {
    /// Create empty fragments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, condition: impl Into<SqlExpression>) -> Self {
        self.filters.push(condition.into());
        self
    }

    /// Add a GROUP BY term.
    pub fn group_by(mut self, term: impl Into<SqlExpression>) -> Self {
        self.group_by.push(term.into());
        self
    }

    /// Add an ORDER BY term.
    pub fn order_by(mut self, term: impl Into<SqlExpression>) -> Self {
        self.order_by.push(term.into());
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, rows: u64) -> Self {
        self.limit = Some(rows);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, rows: u64) -> Self {
        self.offset = Some(rows);
        self
    }

    /// Bind a named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }
}

/// A rendered statement ready for a parameterized-query API.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
}

/// Render a statement for `graph`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn render(graph: &JoinGraph, fragments: &Fragments, dialect: &Dialect) -> Result<Statement> {
    let assembled = assemble(graph, fragments, dialect)?;
    let (text, positional) = assembled.into_parts();
    let resolved = markers::resolve(&text, graph, dialect)?;
    let statement = bind_parameters(&resolved, positional, &fragments.named, dialect)?;

    tracing::debug!(
        sql = %statement.sql,
        params = statement.params.len(),
        "Rendered statement"
    );
    Ok(statement)
}

fn assemble(graph: &JoinGraph, fragments: &Fragments, dialect: &Dialect) -> Result<SqlExpression> {
    let Some(root) = graph.root() else {
        return Err(config_error(
            ConfigErrorKind::InvalidDefinition,
            "cannot render an empty join graph",
        ));
    };

    let mut parts: Vec<SqlExpression> = Vec::new();

    let columns: Vec<String> = graph
        .select
        .iter()
        .map(|f| format!("{} AS {}", select_expr(&f.expression, dialect), dialect.alias(&f.label)))
        .collect();
    parts.push(SqlExpression::new(format!("SELECT {}", columns.join(", "))));
    parts.push(SqlExpression::new(format!(
        "FROM {} AS {}",
        dialect.table(&root.table),
        dialect.alias(&root.path)
    )));

    for alias in &graph.aliases[1..] {
        let Some(join) = &alias.join else {
            continue;
        };
        let on = match &join.condition {
            JoinCondition::Columns(pairs) => pairs
                .iter()
                .map(|(l, r)| format!("{} = {}", column(l, dialect), column(r, dialect)))
                .collect::<Vec<_>>()
                .join(" AND "),
            JoinCondition::Raw(sql) => sql.clone(),
        };
        let mut clause = SqlExpression::new(format!(
            "{} {} AS {} ON {}",
            join.join_type.as_sql(),
            dialect.table(&alias.table),
            dialect.alias(&alias.path),
            on
        ));
        if let Some(restriction) = &join.restriction {
            clause = clause.concat(&SqlExpression::new(" AND ")).concat(&restrict(restriction, dialect));
        }
        parts.push(clause);
    }
    parts.extend(graph.extra_joins.iter().map(SqlExpression::new));

    let mut conditions: Vec<SqlExpression> = Vec::new();
    if let Some(restriction) = &graph.restriction {
        conditions.push(restrict(restriction, dialect));
    }
    conditions.extend(fragments.filters.iter().filter(|f| !f.is_empty()).cloned());
    if !conditions.is_empty() {
        let joined = if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            let wrapped: Vec<SqlExpression> = conditions.iter().map(SqlExpression::parenthesize).collect();
            SqlExpression::join(&wrapped, " AND ")
        };
        parts.push(SqlExpression::new("WHERE ").concat(&joined));
    }

    let mut groups: Vec<SqlExpression> = graph
        .group_by
        .iter()
        .map(|g| SqlExpression::new(select_expr(g, dialect)))
        .collect();
    groups.extend(fragments.group_by.iter().cloned());
    if !groups.is_empty() {
        parts.push(SqlExpression::new("GROUP BY ").concat(&SqlExpression::join(&groups, ", ")));
    }

    if !fragments.order_by.is_empty() {
        parts.push(
            SqlExpression::new("ORDER BY ").concat(&SqlExpression::join(&fragments.order_by, ", ")),
        );
    }
    if let Some(limit) = fragments.limit {
        parts.push(SqlExpression::new(format!("LIMIT {limit}")));
    }
    if let Some(offset) = fragments.offset {
        parts.push(SqlExpression::new(format!("OFFSET {offset}")));
    }

    Ok(SqlExpression::join(&parts, "\n"))
}

fn column(c: &ColumnRef, dialect: &Dialect) -> String {
    format!("{}.{}", dialect.alias(&c.alias), dialect.name(&c.column))
}

fn select_expr(expr: &SelectExpr, dialect: &Dialect) -> String {
    match expr {
        SelectExpr::Column(c) => column(c, dialect),
        SelectExpr::Raw(sql) => sql.clone(),
    }
}

/// Discriminator values are bound, never inlined as literals.
fn restrict(restriction: &Restriction, dialect: &Dialect) -> SqlExpression {
    let markers = vec!["?"; restriction.values.len()].join(", ");
    SqlExpression::with_params(
        format!("{} IN ({markers})", column(&restriction.column, dialect)),
        restriction.values.iter().cloned().map(Value::Text).collect(),
    )
}

/// Rewrite `?` and `:name` markers to dialect placeholders.
///
/// Positional values are consumed in textual order; named markers take their
/// bound value each time they appear.
pub fn bind_parameters(
    sql: &str,
    positional: Vec<Value>,
    named: &HashMap<String, Value>,
    dialect: &Dialect,
) -> Result<Statement> {
    let scan = params::scan(sql)?;
    let expected = scan.positional_count();
    if expected != positional.len() {
        return Err(config_error(
            ConfigErrorKind::ParameterMismatch,
            format!(
                "statement has {expected} positional markers but {} values were supplied",
                positional.len()
            ),
        ));
    }

    let mut positional = positional.into_iter();
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::with_capacity(scan.markers.len());
    let mut last = 0;
    for marker in &scan.markers {
        let span = marker.span();
        let value = match marker {
            ParamMarker::Positional { .. } => positional.next(),
            ParamMarker::Named { name, .. } => Some(named.get(name).cloned().ok_or_else(|| {
                config_error(
                    ConfigErrorKind::ParameterMismatch,
                    format!("no value bound for :{name}"),
                )
            })?),
        };
        let Some(value) = value else {
            break;
        };
        params.push(value);
        out.push_str(&sql[last..span.start]);
        out.push_str(&dialect.placeholder(params.len()));
        last = span.end;
    }
    out.push_str(&sql[last..]);

    Ok(Statement { sql: out, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join_graph::build;
    use rowgraph_core::{Catalog, DynamicSource, Error, FieldDef, PlaceholderStyle, TypeDef, ValueType};

    fn catalog() -> Catalog {
        Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Employee")
                        .table_in("hr", "employee")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::value("name", ValueType::Text))
                        .field(FieldDef::named("department", "Department")),
                )
                .with(
                    TypeDef::new("Department")
                        .table("department")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::value("title", ValueType::Text)),
                ),
        )
    }

    #[test]
    fn test_render_full_statement() {
        let graph = build(&catalog(), "Employee").unwrap();
        let fragments = Fragments::new()
            .filter(SqlExpression::new("{department.title} = ?").bind("R&D"))
            .order_by("{employee.name}")
            .limit(10);
        let statement = render(&graph, &fragments, &Dialect::postgres()).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT \"employee\".\"id\" AS \"employee.id\", \"employee\".\"name\" AS \"employee.name\", \
             \"department\".\"id\" AS \"department.id\", \"department\".\"title\" AS \"department.title\"\n\
             FROM \"hr\".\"employee\" AS \"employee\"\n\
             LEFT JOIN \"department\" AS \"department\" ON \"department\".\"id\" = \"employee\".\"department_id\"\n\
             WHERE \"department\".\"title\" = $1\n\
             ORDER BY \"employee\".\"name\"\n\
             LIMIT 10"
        );
        assert_eq!(statement.params, vec![Value::Text("R&D".into())]);
    }

    #[test]
    fn test_marker_alias_matches_join_alias() {
        let graph = build(&catalog(), "Employee").unwrap();
        let fragments = Fragments::new().filter("{department} IS NOT NULL");
        let statement = render(&graph, &fragments, &Dialect::mysql()).unwrap();

        let join_line = statement
            .sql
            .lines()
            .find(|l| l.starts_with("LEFT JOIN"))
            .unwrap();
        let join_alias = join_line
            .split(" AS ")
            .nth(1)
            .and_then(|s| s.split(' ').next())
            .unwrap();
        let where_line = statement.sql.lines().find(|l| l.starts_with("WHERE")).unwrap();
        let where_alias = where_line
            .trim_start_matches("WHERE ")
            .split(' ')
            .next()
            .unwrap();
        assert_eq!(join_alias, where_alias);
    }

    #[test]
    fn test_named_and_positional_parameters() {
        let graph = build(&catalog(), "Employee").unwrap();
        let fragments = Fragments::new()
            .filter(SqlExpression::new("{employee.id} > ?").bind(5_i64))
            .filter("{employee.name} IN (:who, :who) AND {employee.name} <> ':skip'")
            .bind("who", "Ada");
        let statement = render(&graph, &fragments, &Dialect::postgres()).unwrap();

        assert!(statement.sql.contains(
            "WHERE (\"employee\".\"id\" > $1) AND (\"employee\".\"name\" IN ($2, $3) AND \"employee\".\"name\" <> ':skip')"
        ));
        assert_eq!(
            statement.params,
            vec![
                Value::BigInt(5),
                Value::Text("Ada".into()),
                Value::Text("Ada".into())
            ]
        );

        let question = Dialect::postgres().with_placeholder(PlaceholderStyle::Question);
        let statement = render(&graph, &fragments, &question).unwrap();
        assert!(statement.sql.contains("IN (?, ?)"));
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let graph = build(&catalog(), "Employee").unwrap();
        let fragments = Fragments::new().filter("{employee.id} = ?");
        let err = render(&graph, &fragments, &Dialect::postgres()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ref c) if c.kind == rowgraph_core::ConfigErrorKind::ParameterMismatch
        ));

        let fragments = Fragments::new().filter("{employee.id} = :id");
        assert!(render(&graph, &fragments, &Dialect::postgres()).is_err());
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let catalog = catalog();
        let fragments = Fragments::new()
            .filter(SqlExpression::new("{employee.name} LIKE ?").bind("A%"))
            .order_by("{department.title}");
        let first = render(&build(&catalog, "Employee").unwrap(), &fragments, &Dialect::default()).unwrap();
        let second = render(&build(&catalog, "Employee").unwrap(), &fragments, &Dialect::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unresolved_marker_in_order_by() {
        let graph = build(&catalog(), "Employee").unwrap();
        let fragments = Fragments::new().order_by("{manager.name}");
        let err = render(&graph, &fragments, &Dialect::postgres()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ref c) if c.kind == rowgraph_core::ConfigErrorKind::UnresolvedMarker
        ));
    }

    #[test]
    fn test_root_restriction_precedes_filters() {
        let catalog = Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Room")
                        .table("room")
                        .discriminator("kind")
                        .subclass("Suite")
                        .field(FieldDef::value("id", ValueType::BigInt).id()),
                )
                .with(TypeDef::new("Suite").superclass("Room").discriminator_value("suite")),
        );
        let graph = build(&catalog, "Suite").unwrap();
        let fragments = Fragments::new().filter("{room.id} > 3");
        let statement = render(&graph, &fragments, &Dialect::sqlite()).unwrap();
        assert!(statement
            .sql
            .ends_with("WHERE (\"room\".\"kind\" IN (?)) AND (\"room\".\"id\" > 3)"));
        assert_eq!(statement.params, vec![Value::Text("suite".into())]);
    }

    #[test]
    fn test_discriminator_values_are_bound() {
        let catalog = Catalog::new().with_source(
            DynamicSource::new()
                .with(
                    TypeDef::new("Room")
                        .table("room")
                        .discriminator("kind")
                        .subclass("Suite")
                        .field(FieldDef::value("id", ValueType::BigInt).id()),
                )
                .with(TypeDef::new("Suite").superclass("Room").discriminator_value("a\\"))
                .with(
                    TypeDef::new("Hotel")
                        .table("hotel")
                        .field(FieldDef::value("id", ValueType::BigInt).id())
                        .field(FieldDef::named("suites", "Suite").list()),
                ),
        );
        let graph = build(&catalog, "Suite").unwrap();
        let statement = render(&graph, &Fragments::new(), &Dialect::postgres()).unwrap();
        assert!(statement.sql.ends_with("WHERE \"room\".\"kind\" IN ($1)"));
        assert_eq!(statement.params, vec![Value::Text("a\\".into())]);

        // A join restriction precedes the filter parameters.
        let graph = build(&catalog, "Hotel").unwrap();
        let fragments = Fragments::new().filter(SqlExpression::new("{hotel.id} = ?").bind(4_i64));
        let statement = render(&graph, &fragments, &Dialect::postgres()).unwrap();
        assert!(statement
            .sql
            .contains("ON \"suites\".\"hotel_id\" = \"hotel\".\"id\" AND \"suites\".\"kind\" IN ($1)"));
        assert!(statement.sql.ends_with("WHERE \"hotel\".\"id\" = $2"));
        assert_eq!(
            statement.params,
            vec![Value::Text("a\\".into()), Value::BigInt(4)]
        );
    }
}
