//! Polymorphic queries over both inheritance strategies.

mod common;

use std::sync::Arc;

use common::{MemoryConnection, row, text};
use rowgraph::prelude::*;

fn discriminated() -> Context {
    let catalog = Catalog::new().with_source(
        DynamicSource::new()
            .with(
                TypeDef::new("Base")
                    .table("item")
                    .discriminator("kind")
                    .subclass("Sub")
                    .field(FieldDef::value("id", ValueType::BigInt).id())
                    .field(FieldDef::value("name", ValueType::Text)),
            )
            .with(
                TypeDef::new("Sub")
                    .superclass("Base")
                    .field(FieldDef::value("extra", ValueType::Int)),
            ),
    );
    Context::new(Arc::new(catalog))
}

fn vertical() -> Context {
    let source = DynamicSource::from_json(
        r#"[
            {
                "name": "Person",
                "table": { "name": "person" },
                "subclasses": ["Employee"],
                "fields": [
                    { "name": "id", "ty": { "value": "big_int" }, "attrs": { "id": true } },
                    { "name": "name", "ty": { "value": "text" } }
                ]
            },
            {
                "name": "Employee",
                "table": { "name": "employee" },
                "superclass": "Person",
                "subclasses": ["Manager"],
                "fields": [
                    { "name": "salary", "ty": { "value": "double" } }
                ]
            },
            {
                "name": "Manager",
                "table": { "name": "manager" },
                "superclass": "Employee",
                "fields": [
                    { "name": "reports", "ty": { "value": "int" } }
                ]
            }
        ]"#,
    )
    .unwrap();
    Context::new(Arc::new(Catalog::new().with_source(source)))
}

fn item(id: i64, kind: &str, extra: Option<i32>) -> Row {
    row(&[
        ("item.kind", text(kind)),
        ("item.id", Value::BigInt(id)),
        ("item.name", text(&format!("item-{id}"))),
        ("item.extra", extra.map_or(Value::Null, Value::Int)),
    ])
}

#[test]
fn test_discriminator_selects_subtype() {
    let context = discriminated();
    let mut connection = MemoryConnection::new(vec![
        item(1, "Sub", Some(5)),
        item(2, "Base", None),
        item(3, "Mystery", None),
    ]);
    let graph = context.query("Base").execute(&mut connection).unwrap();

    let types: Vec<_> = graph.roots().map(|o| o.type_name.as_str()).collect();
    assert_eq!(types, vec!["Sub", "Base", "Base"]);

    let roots: Vec<_> = graph.roots().collect();
    assert_eq!(roots[0].value("extra"), Some(&Value::Int(5)));
    assert!(roots[1].get("extra").is_none());
    assert_eq!(roots[2].value("name"), Some(&text("item-3")));
}

#[test]
fn test_querying_a_subtype_restricts_the_discriminator() {
    let context = discriminated();
    let statement = context.query("Sub").to_statement().unwrap();
    assert!(statement.sql.contains("FROM \"item\" AS \"item\""));
    assert!(statement.sql.ends_with("WHERE \"item\".\"kind\" IN ($1)"));
    assert_eq!(statement.params, vec![text("Sub")]);

    let statement = context.query("Base").to_statement().unwrap();
    assert!(!statement.sql.contains("WHERE"));
}

#[test]
fn test_vertical_hierarchy_joins_each_level() {
    let context = vertical();
    let sql = context.query("Person").compile().unwrap().sql().to_string();

    assert!(sql.contains(
        "LEFT JOIN \"employee\" AS \"person.employee\" \
         ON \"person.employee\".\"id\" = \"person\".\"id\""
    ));
    assert!(sql.contains("LEFT JOIN \"manager\" AS \"person.manager\""));
    assert!(sql.contains("\"person.manager\".\"reports\" AS \"person.manager.reports\""));
}

#[test]
fn test_vertical_hierarchy_selects_deepest_present_level() {
    let context = vertical();
    let mut connection = MemoryConnection::new(vec![
        row(&[
            ("person.id", Value::BigInt(1)),
            ("person.name", text("Ada")),
            ("person.employee.id", Value::BigInt(1)),
            ("person.employee.salary", Value::Double(10.0)),
            ("person.manager.id", Value::BigInt(1)),
            ("person.manager.reports", Value::Int(4)),
        ]),
        row(&[
            ("person.id", Value::BigInt(2)),
            ("person.name", text("Grace")),
            ("person.employee.id", Value::BigInt(2)),
            ("person.employee.salary", Value::Double(8.5)),
            ("person.manager.id", Value::Null),
            ("person.manager.reports", Value::Null),
        ]),
        row(&[
            ("person.id", Value::BigInt(3)),
            ("person.name", text("Edsger")),
            ("person.employee.id", Value::Null),
            ("person.employee.salary", Value::Null),
            ("person.manager.id", Value::Null),
            ("person.manager.reports", Value::Null),
        ]),
    ]);
    let graph = context.query("Person").execute(&mut connection).unwrap();

    let roots: Vec<_> = graph.roots().collect();
    let types: Vec<_> = roots.iter().map(|o| o.type_name.as_str()).collect();
    assert_eq!(types, vec!["Manager", "Employee", "Person"]);

    assert_eq!(roots[0].value("reports"), Some(&Value::Int(4)));
    assert_eq!(roots[0].value("salary"), Some(&Value::Double(10.0)));
    assert_eq!(roots[1].value("salary"), Some(&Value::Double(8.5)));
    assert!(roots[1].get("reports").is_none());
    assert!(roots[2].get("salary").is_none());
    assert_eq!(roots[2].value("name"), Some(&text("Edsger")));
}

#[test]
fn test_querying_a_vertical_subtype_inner_joins_ancestors() {
    let context = vertical();
    let sql = context.query("Manager").compile().unwrap().sql().to_string();
    assert!(sql.contains("FROM \"manager\" AS \"manager\""));
    assert!(sql.contains("INNER JOIN \"person\" AS \"manager.person\""));
    assert!(sql.contains("INNER JOIN \"employee\" AS \"manager.employee\""));
}

#[test]
fn test_vertical_subclass_without_table_is_rejected() {
    let catalog = Catalog::new().with_source(
        DynamicSource::new()
            .with(
                TypeDef::new("Person")
                    .table("person")
                    .subclass("Contractor")
                    .field(FieldDef::value("id", ValueType::BigInt).id()),
            )
            .with(
                TypeDef::new("Contractor")
                    .superclass("Person")
                    .field(FieldDef::value("rate", ValueType::Double)),
            ),
    );
    let context = Context::new(Arc::new(catalog));
    let mut connection = MemoryConnection::new(Vec::new());
    let err = context.query("Person").execute(&mut connection).unwrap_err();

    let Error::Config(config) = err else {
        panic!("expected a config error, got {err}");
    };
    assert_eq!(config.kind, rowgraph::ConfigErrorKind::MissingTable);
    assert_eq!(config.type_name.as_deref(), Some("Contractor"));
    assert!(connection.executed.is_empty());
}
