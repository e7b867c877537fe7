use whodb_core::{CanonicalType, Category, Column, ForeignKeyEdge, StorageUnit, Value};

#[test]
fn storage_unit_serializes_with_canonical_types() {
    let unit = StorageUnit {
        name: "customers".to_string(),
        category: Category::Sql,
        kind: "BASE TABLE".to_string(),
        row_count: Some(3),
        size: None,
        columns: vec![
            Column::new("id", "integer").primary().auto(),
            Column::new("email", "varchar(120)").not_null().unique(),
        ],
    };

    let json = serde_json::to_value(&unit).expect("serialize unit");
    assert_eq!(json["category"], "sql");
    assert_eq!(json["columns"][0]["canonical"]["kind"], "integer");
    assert_eq!(json["columns"][0]["canonical"]["bytes"], 4);
    assert_eq!(json["columns"][1]["canonical"]["max_len"], 120);
    assert!(json.get("size").is_none());

    let back: StorageUnit = serde_json::from_value(json).expect("deserialize unit");
    assert_eq!(back, unit);
}

#[test]
fn edges_serialize_cardinality_in_snake_case() {
    let edge = ForeignKeyEdge::new("orders", "customer_id", "customers", "id")
        .named("orders_customer_id_fkey");
    let json = serde_json::to_value(&edge).expect("serialize edge");
    assert_eq!(json["cardinality"], "one_to_many");
    assert_eq!(json["constraint"], "orders_customer_id_fkey");
}

#[test]
fn values_keep_their_variant_through_serde() {
    let values = vec![
        Value::Null,
        Value::Int(-4),
        Value::Decimal("12.50".to_string()),
        Value::Text("hello".to_string()),
        Value::Json(serde_json::json!({"a": [1, 2]})),
    ];
    let json = serde_json::to_string(&values).expect("serialize values");
    let back: Vec<Value> = serde_json::from_str(&json).expect("deserialize values");
    assert_eq!(back, values);
}

#[test]
fn canonical_type_parse_is_case_insensitive() {
    assert_eq!(
        CanonicalType::from_native("VarChar(12)"),
        CanonicalType::from_native("varchar(12)")
    );
}
