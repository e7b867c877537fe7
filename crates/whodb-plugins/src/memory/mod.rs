//! In-process reference store.
//!
//! Holds rows for any category behind a `tokio` lock and enforces the same
//! constraints a relational backend would (primary keys, unique columns,
//! NOT NULL, length bounds, foreign keys with RESTRICT), reporting them with
//! Postgres-style messages.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use whodb_core::{
    Cardinality, Category, Column, Condition, Error, ForeignKeyEdge, Page, Result, Row,
    RowIdentity, RowSet, Sort, StorageUnit,
};

use crate::plugin::{Plugin, PluginDescriptor};

mod definition;
mod store;

pub use definition::{ForeignKeyDefinition, UnitDefinition};

use store::{MemoryState, UnitState};

/// Default store type per category.
pub fn default_store_type(category: Category) -> &'static str {
    match category {
        Category::Sql => "Memory",
        Category::Document => "MemoryDocument",
        Category::KeyValue => "MemoryKeyValue",
    }
}

pub struct MemoryPluginBuilder {
    descriptor: PluginDescriptor,
    units: Vec<UnitDefinition>,
    foreign_keys: Vec<ForeignKeyDefinition>,
}

impl MemoryPluginBuilder {
    pub fn store_type(mut self, store_type: impl Into<String>) -> Self {
        self.descriptor.store_type = store_type.into();
        self
    }

    pub fn unit(mut self, definition: UnitDefinition) -> Self {
        self.units.push(definition);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKeyDefinition) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Check that every foreign key names declared units and columns.
    pub fn build(self) -> Result<MemoryPlugin> {
        let category = self.descriptor.category;
        let units: Vec<UnitState> = self
            .units
            .into_iter()
            .map(|definition| UnitState::new(definition, category))
            .collect();

        for fk in &self.foreign_keys {
            if fk.from_columns.len() != fk.to_columns.len() || fk.from_columns.is_empty() {
                return Err(Error::Unsupported(format!(
                    "foreign key '{}' must pair the same number of columns",
                    fk.name
                )));
            }
            for (unit, columns) in [(&fk.from_unit, &fk.from_columns), (&fk.to_unit, &fk.to_columns)] {
                let state = units
                    .iter()
                    .find(|state| state.name() == unit)
                    .ok_or_else(|| Error::NotFound(format!("storage unit '{unit}'")))?;
                for column in columns {
                    if !state.columns().iter().any(|c| &c.name == column) {
                        return Err(Error::NotFound(format!(
                            "column '{column}' of storage unit '{unit}'"
                        )));
                    }
                }
            }
        }

        Ok(MemoryPlugin {
            descriptor: self.descriptor,
            state: RwLock::new(MemoryState {
                units,
                foreign_keys: self.foreign_keys,
                clear_log: Vec::new(),
            }),
            calls: AtomicU64::new(0),
        })
    }
}

/// Reference plugin backed by process memory.
pub struct MemoryPlugin {
    descriptor: PluginDescriptor,
    state: RwLock<MemoryState>,
    calls: AtomicU64,
}

impl MemoryPlugin {
    pub fn builder(category: Category) -> MemoryPluginBuilder {
        MemoryPluginBuilder {
            descriptor: PluginDescriptor::new(category, default_store_type(category)),
            units: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Number of contract calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Units cleared through `clear_unit`, oldest first.
    pub async fn clear_log(&self) -> Vec<String> {
        self.state.read().await.clear_log.clone()
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn is_one_to_one(state: &UnitState, fk: &ForeignKeyDefinition) -> bool {
        let primary: Vec<&str> = state
            .columns()
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        let same_as_primary = !primary.is_empty()
            && primary.len() == fk.from_columns.len()
            && fk.from_columns.iter().all(|c| primary.contains(&c.as_str()));
        let single_unique = fk.from_columns.len() == 1
            && state
                .columns()
                .iter()
                .any(|c| c.name == fk.from_columns[0] && c.unique);
        same_as_primary || single_unique
    }
}

#[async_trait]
impl Plugin for MemoryPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        self.descriptor.clone()
    }

    async fn list_storage_units(&self) -> Result<Vec<StorageUnit>> {
        self.record();
        let state = self.state.read().await;
        Ok(state
            .units
            .iter()
            .map(|unit| StorageUnit {
                name: unit.name().to_string(),
                category: unit.category,
                kind: unit.kind.clone(),
                row_count: Some(unit.rows.len() as u64),
                size: None,
                columns: unit.columns().to_vec(),
            })
            .collect())
    }

    async fn get_columns(&self, unit: &str) -> Result<Vec<Column>> {
        self.record();
        let state = self.state.read().await;
        Ok(state.unit(unit)?.columns().to_vec())
    }

    async fn get_relationships(&self, unit: &str) -> Result<Vec<ForeignKeyEdge>> {
        self.record();
        let state = self.state.read().await;
        let owner = state.unit(unit)?;
        let mut edges = Vec::new();
        for fk in state.foreign_keys.iter().filter(|fk| fk.from_unit == unit) {
            let cardinality = if Self::is_one_to_one(owner, fk) {
                Cardinality::OneToOne
            } else {
                Cardinality::OneToMany
            };
            for (from, to) in fk.from_columns.iter().zip(&fk.to_columns) {
                edges.push(
                    ForeignKeyEdge::new(unit, from, &fk.to_unit, to)
                        .named(&fk.name)
                        .with_cardinality(cardinality),
                );
            }
        }
        Ok(edges)
    }

    async fn query(
        &self,
        unit: &str,
        conditions: &[Condition],
        sort: &[Sort],
        page: Option<Page>,
    ) -> Result<RowSet> {
        self.record();
        let state = self.state.read().await;
        let (columns, rows) = state.select(unit, conditions, sort, page)?;
        let owner = state.unit(unit)?;
        debug!(event = "memory.query", unit = %unit, rows = rows.len());
        Ok(RowSet {
            columns,
            rows,
            disable_update: owner.is_view() || owner.category == Category::KeyValue,
        })
    }

    async fn add_row(&self, unit: &str, cells: Row) -> Result<Row> {
        self.record();
        let mut state = self.state.write().await;
        let row = state.insert(unit, cells)?;
        debug!(event = "memory.insert", unit = %unit);
        Ok(row)
    }

    async fn bulk_add_rows(&self, unit: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        self.record();
        let mut state = self.state.write().await;
        let written = state.insert_all(unit, rows)?;
        debug!(event = "memory.bulk_insert", unit = %unit, rows = written.len());
        Ok(written)
    }

    async fn update_row(&self, unit: &str, identity: &RowIdentity, cells: Row) -> Result<Row> {
        self.record();
        let mut state = self.state.write().await;
        state.update(unit, identity, cells)
    }

    async fn delete_row(&self, unit: &str, identity: &RowIdentity) -> Result<()> {
        self.record();
        let mut state = self.state.write().await;
        state.delete(unit, identity)
    }

    async fn count(&self, unit: &str, conditions: &[Condition]) -> Result<u64> {
        self.record();
        let state = self.state.read().await;
        let (_, rows) = state.select(unit, conditions, &[], None)?;
        Ok(rows.len() as u64)
    }

    async fn clear_unit(&self, unit: &str) -> Result<u64> {
        self.record();
        let mut state = self.state.write().await;
        let removed = state.clear(unit)?;
        debug!(event = "memory.clear", unit = %unit, rows = removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use whodb_core::{ErrorKind, Operator, Value};

    use super::*;

    fn shop() -> MemoryPlugin {
        MemoryPlugin::builder(Category::Sql)
            .unit(UnitDefinition::new(
                "customers",
                vec![
                    Column::new("id", "serial").primary().auto(),
                    Column::new("email", "varchar(40)").not_null().unique(),
                ],
            ))
            .unit(UnitDefinition::new(
                "orders",
                vec![
                    Column::new("id", "serial").primary().auto(),
                    Column::new("customer_id", "integer").not_null(),
                    Column::new("total", "numeric(8,2)"),
                ],
            ))
            .foreign_key(ForeignKeyDefinition::new("orders", "customer_id", "customers", "id"))
            .build()
            .expect("valid memory schema")
    }

    #[tokio::test]
    async fn assigns_auto_increment_ids() {
        let plugin = shop();
        let first = plugin
            .add_row("customers", Row::new().with("email", "a@x.io"))
            .await
            .unwrap();
        let second = plugin
            .add_row("customers", Row::new().with("email", "b@x.io"))
            .await
            .unwrap();
        assert_eq!(first.get("id"), Some(&Value::Int(1)));
        assert_eq!(second.get("id"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn enforces_unique_and_not_null() {
        let plugin = shop();
        plugin
            .add_row("customers", Row::new().with("email", "a@x.io"))
            .await
            .unwrap();
        let err = plugin
            .add_row("customers", Row::new().with("email", "a@x.io"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("customers_email_key"));

        let err = plugin.add_row("customers", Row::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(err.to_string().contains("not-null"));
    }

    #[tokio::test]
    async fn bulk_insert_is_all_or_nothing() {
        let plugin = shop();
        let rows = vec![
            Row::new().with("email", "a@x.io"),
            Row::new().with("email", "b@x.io"),
            Row::new().with("email", "a@x.io"),
        ];
        let err = plugin.bulk_add_rows("customers", rows).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(plugin.count("customers", &[]).await.unwrap(), 0);

        let written = plugin
            .bulk_add_rows("customers", vec![Row::new().with("email", "c@x.io")])
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(plugin.count("customers", &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn enforces_length_bounds() {
        let plugin = shop();
        let err = plugin
            .add_row("customers", Row::new().with("email", "x".repeat(41)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("value too long"));
    }

    #[tokio::test]
    async fn foreign_keys_restrict_writes_and_deletes() {
        let plugin = shop();
        let err = plugin
            .add_row("orders", Row::new().with("customer_id", 9))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("orders_customer_id_fkey"));

        let customer = plugin
            .add_row("customers", Row::new().with("email", "a@x.io"))
            .await
            .unwrap();
        let id = customer.get("id").cloned().unwrap();
        plugin
            .add_row("orders", Row::new().with("customer_id", id.clone()))
            .await
            .unwrap();

        let err = plugin
            .delete_row("customers", &RowIdentity::single("id", id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

        let err = plugin.clear_unit("customers").await.unwrap_err();
        assert!(err.to_string().contains("on table \"orders\""));

        assert_eq!(plugin.clear_unit("orders").await.unwrap(), 1);
        assert_eq!(plugin.clear_unit("customers").await.unwrap(), 1);
        assert_eq!(plugin.clear_log().await, vec!["orders", "customers"]);
    }

    #[tokio::test]
    async fn text_conditions_are_coerced_to_column_types() {
        let plugin = shop();
        for email in ["a@x.io", "b@x.io", "c@x.io"] {
            plugin
                .add_row("customers", Row::new().with("email", email))
                .await
                .unwrap();
        }
        let rows = plugin
            .query(
                "customers",
                &[Condition::new("id", Operator::Ge, "2")],
                &[Sort::desc("id")],
                Some(Page::first(1)),
            )
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0].get("id"), Some(&Value::Int(3)));
        assert_eq!(
            plugin
                .count("customers", &[Condition::new("email", Operator::Ne, "a@x.io")])
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn relationships_report_cardinality() {
        let plugin = MemoryPlugin::builder(Category::Sql)
            .unit(UnitDefinition::new("users", vec![Column::new("id", "int").primary()]))
            .unit(UnitDefinition::new(
                "profiles",
                vec![Column::new("user_id", "int").primary()],
            ))
            .foreign_key(ForeignKeyDefinition::new("profiles", "user_id", "users", "id"))
            .build()
            .unwrap();
        let edges = plugin.get_relationships("profiles").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].cardinality, Cardinality::OneToOne);
        assert!(plugin.get_relationships("users").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn key_value_units_reject_sorting() {
        let plugin = MemoryPlugin::builder(Category::KeyValue)
            .unit(UnitDefinition::schemaless("sessions"))
            .build()
            .unwrap();
        plugin
            .add_row("sessions", Row::new().with("key", "s:1").with("value", "x"))
            .await
            .unwrap();
        let err = plugin
            .query("sessions", &[], &[Sort::asc("key")], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let rows = plugin
            .query("sessions", &[Condition::eq("key", "s:1")], &[], None)
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert!(rows.disable_update);
    }

    #[tokio::test]
    async fn documents_get_ids_and_match_filters() {
        let plugin = MemoryPlugin::builder(Category::Document)
            .unit(UnitDefinition::schemaless("events"))
            .build()
            .unwrap();
        let written = plugin
            .add_row("events", Row::new().with("kind", "click").with("n", 3))
            .await
            .unwrap();
        assert!(matches!(written.get("_id"), Some(Value::Text(id)) if id.len() == 32));
        plugin
            .add_row("events", Row::new().with("kind", "view").with("n", 5))
            .await
            .unwrap();

        let rows = plugin
            .query(
                "events",
                &[Condition::new("kind", Operator::Match, "^cl")],
                &[],
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert!(rows.columns.contains(&"kind".to_string()));
        assert_eq!(
            plugin
                .count("events", &[Condition::new("n", Operator::Gt, 4)])
                .await
                .unwrap(),
            1
        );
    }

    #[test]
    fn builder_rejects_unknown_foreign_key_columns() {
        let result = MemoryPlugin::builder(Category::Sql)
            .unit(UnitDefinition::new("a", vec![Column::new("id", "int").primary()]))
            .foreign_key(ForeignKeyDefinition::new("a", "b_id", "b", "id"))
            .build();
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
