use std::sync::Arc;

use whodb_core::{
    Category, Column, Condition, EngineConfig, Error, ErrorKind, Operator, Row, RowIdentity,
    Value,
};
use whodb_engine::{Facade, MutationOutcome, PluginRegistry, RowMutation};
use whodb_plugins::{ForeignKeyDefinition, MemoryPlugin, Plugin, UnitDefinition};

fn shop() -> Arc<MemoryPlugin> {
    Arc::new(
        MemoryPlugin::builder(Category::Sql)
            .unit(UnitDefinition::new(
                "customers",
                vec![
                    Column::new("id", "serial").primary().auto(),
                    Column::new("name", "text").not_null(),
                    Column::new("note", "text"),
                ],
            ))
            .unit(UnitDefinition::new(
                "orders",
                vec![
                    Column::new("id", "serial").primary().auto(),
                    Column::new("customer_id", "integer").not_null(),
                ],
            ))
            .foreign_key(ForeignKeyDefinition::new("orders", "customer_id", "customers", "id"))
            .build()
            .expect("valid schema"),
    )
}

#[tokio::test]
async fn unsupported_operator_fails_before_plugin_call() {
    let plugin = shop();
    let facade = Facade::new(plugin.clone(), EngineConfig::default());

    let err = facade
        .query(
            "customers",
            &[
                Condition::eq("name", "Ada"),
                Condition::new("name", Operator::Match, "^A"),
            ],
            &[],
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    assert_eq!(plugin.calls(), 0);

    let err = facade
        .count("customers", &[Condition::new("name", Operator::Match, "x")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedOperator {
            category: Category::Sql,
            ..
        }
    ));
    assert_eq!(plugin.calls(), 0);
}

#[tokio::test]
async fn key_value_facade_accepts_only_equality() {
    let plugin = Arc::new(
        MemoryPlugin::builder(Category::KeyValue)
            .unit(UnitDefinition::schemaless("cache"))
            .build()
            .unwrap(),
    );
    let facade = Facade::new(plugin.clone(), EngineConfig::default());
    let err = facade
        .count("cache", &[Condition::new("key", Operator::Ne, "a")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    assert_eq!(plugin.calls(), 0);
    assert_eq!(
        facade
            .count("cache", &[Condition::eq("key", "a")])
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn mutate_row_covers_add_update_delete() {
    let facade = Facade::new(shop(), EngineConfig::default());

    let added = match facade
        .mutate_row("customers", RowMutation::Add(Row::new().with("name", "Ada")))
        .await
        .unwrap()
    {
        MutationOutcome::Added(row) => row,
        other => panic!("unexpected outcome: {other:?}"),
    };
    let identity = RowIdentity::single("id", added.get("id").cloned().unwrap());

    let updated = facade
        .mutate_row(
            "customers",
            RowMutation::Update {
                identity: identity.clone(),
                cells: Row::new().with("note", "vip"),
            },
        )
        .await
        .unwrap();
    match updated {
        MutationOutcome::Updated(row) => {
            assert_eq!(row.get("note"), Some(&Value::Text("vip".to_string())))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        facade
            .mutate_row("customers", RowMutation::Delete(identity.clone()))
            .await
            .unwrap(),
        MutationOutcome::Deleted
    );
    let err = facade
        .mutate_row("customers", RowMutation::Delete(identity))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn constraint_messages_pass_through_unchanged() {
    let facade = Facade::new(shop(), EngineConfig::default());
    let err = facade
        .add_row("orders", Row::new().with("customer_id", 42))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "constraint violation on 'orders': insert or update on table \"orders\" violates \
         foreign key constraint \"orders_customer_id_fkey\""
    );
}

#[tokio::test]
async fn export_pages_through_every_row() {
    let facade = Facade::new(
        shop(),
        EngineConfig::default().with_export_page_size(2),
    );
    for name in ["Ada", "Grace", "Linus", "Barbara", "Ken"] {
        facade
            .add_row("customers", Row::new().with("name", name))
            .await
            .unwrap();
    }

    let mut out = Vec::new();
    let written = facade
        .export_csv(
            "customers",
            &[Condition::new("id", Operator::Gt, 1)],
            &mut out,
        )
        .await
        .unwrap();
    assert_eq!(written, 4);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "id,name,note\n2,Grace,\n3,Linus,\n4,Barbara,\n5,Ken,\n"
    );
}

#[tokio::test]
async fn snapshot_resolves_graph() {
    let facade = Facade::new(shop(), EngineConfig::default());
    let snapshot = facade.schema_snapshot().await.unwrap();
    assert_eq!(snapshot.graph.ancestors("orders").unwrap(), vec!["customers"]);
    assert_eq!(snapshot.unit("orders").unwrap().columns.len(), 2);
    assert!(snapshot.unit("missing").is_err());
}

#[tokio::test]
async fn registry_connects_facade() {
    let mut registry = PluginRegistry::new();
    let plugin: Arc<dyn Plugin> = shop();
    registry.register(plugin).unwrap();
    let facade = Facade::connect(&registry, "memory", EngineConfig::default()).unwrap();
    assert_eq!(facade.category(), Category::Sql);
    assert_eq!(facade.store_type(), "Memory");
    assert_eq!(facade.list_units().await.unwrap().len(), 2);
}
