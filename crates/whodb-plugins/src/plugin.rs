use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use whodb_core::{
    Category, Column, Condition, ForeignKeyEdge, Page, Result, Row, RowIdentity, RowSet, Sort,
    StorageUnit,
};

/// Registration identity of a plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub category: Category,
    /// Store type identifier such as `Postgres`, `MongoDB` or `Redis`.
    pub store_type: String,
}

impl PluginDescriptor {
    pub fn new(category: Category, store_type: impl Into<String>) -> Self {
        Self {
            category,
            store_type: store_type.into(),
        }
    }
}

/// Unified contract implemented once per backend.
///
/// All values crossing this boundary are canonical [`whodb_core::Value`]s; the
/// plugin owns translation to and from its native representation. Plugins keep
/// no row cache, so every call is a fresh round trip.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> PluginDescriptor;

    async fn list_storage_units(&self) -> Result<Vec<StorageUnit>>;

    async fn get_columns(&self, unit: &str) -> Result<Vec<Column>>;

    /// Foreign keys declared on `unit` (the unit is the referencing side).
    async fn get_relationships(&self, unit: &str) -> Result<Vec<ForeignKeyEdge>>;

    async fn query(
        &self,
        unit: &str,
        conditions: &[Condition],
        sort: &[Sort],
        page: Option<Page>,
    ) -> Result<RowSet>;

    /// Insert one row and return it as written, backend-assigned values included.
    async fn add_row(&self, unit: &str, cells: Row) -> Result<Row>;

    async fn update_row(&self, unit: &str, identity: &RowIdentity, cells: Row) -> Result<Row>;

    async fn delete_row(&self, unit: &str, identity: &RowIdentity) -> Result<()>;

    async fn count(&self, unit: &str, conditions: &[Condition]) -> Result<u64>;

    /// Delete every row of `unit`; returns the number of rows removed.
    async fn clear_unit(&self, unit: &str) -> Result<u64>;

    async fn bulk_add_rows(&self, unit: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            written.push(self.add_row(unit, row).await?);
        }
        Ok(written)
    }
}
