use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use whodb_core::{
    Category, Column, Condition, EngineConfig, ForeignKeyEdge, Page, Result, Row, RowIdentity,
    RowSet, Sort, StorageUnit,
};
use whodb_plugins::Plugin;

use crate::export;
use crate::registry::PluginRegistry;
use crate::resolver::{self, SchemaSnapshot};

/// Single row change routed through [`Facade::mutate_row`].
#[derive(Debug, Clone, PartialEq)]
pub enum RowMutation {
    Add(Row),
    Update { identity: RowIdentity, cells: Row },
    Delete(RowIdentity),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Added(Row),
    Updated(Row),
    Deleted,
}

/// Entry point over the plugin of one active connection.
///
/// Holds nothing mutable: cloning is cheap and clones may be used
/// concurrently for disjoint work.
#[derive(Clone)]
pub struct Facade {
    plugin: Arc<dyn Plugin>,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for Facade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facade")
            .field("plugin", &self.plugin.descriptor())
            .field("config", &self.config)
            .finish()
    }
}

impl Facade {
    pub fn new(plugin: Arc<dyn Plugin>, config: EngineConfig) -> Self {
        Self {
            plugin,
            config: Arc::new(config),
        }
    }

    /// Resolve the plugin for `store_type` once and wrap it.
    pub fn connect(registry: &PluginRegistry, store_type: &str, config: EngineConfig) -> Result<Self> {
        let plugin = registry.choose(store_type)?;
        info!(event = "facade.connect", store_type = %store_type);
        Ok(Self::new(plugin, config))
    }

    pub fn category(&self) -> Category {
        self.plugin.descriptor().category
    }

    pub fn store_type(&self) -> String {
        self.plugin.descriptor().store_type
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reject conditions outside the active category's operator set.
    pub fn check_conditions(&self, conditions: &[Condition]) -> Result<()> {
        let category = self.category();
        self.config.operators(category)?.check(category, conditions)
    }

    pub async fn list_units(&self) -> Result<Vec<StorageUnit>> {
        let units = self.plugin.list_storage_units().await?;
        debug!(event = "facade.list_units", units = units.len());
        Ok(units)
    }

    pub async fn columns(&self, unit: &str) -> Result<Vec<Column>> {
        self.plugin.get_columns(unit).await
    }

    pub async fn relationships(&self, unit: &str) -> Result<Vec<ForeignKeyEdge>> {
        self.plugin.get_relationships(unit).await
    }

    pub async fn query(
        &self,
        unit: &str,
        conditions: &[Condition],
        sort: &[Sort],
        page: Option<Page>,
    ) -> Result<RowSet> {
        self.check_conditions(conditions)?;
        let rows = self.plugin.query(unit, conditions, sort, page).await?;
        debug!(
            event = "facade.query",
            unit = %unit,
            conditions = conditions.len(),
            rows = rows.rows.len()
        );
        Ok(rows)
    }

    pub async fn count(&self, unit: &str, conditions: &[Condition]) -> Result<u64> {
        self.check_conditions(conditions)?;
        self.plugin.count(unit, conditions).await
    }

    pub async fn add_row(&self, unit: &str, cells: Row) -> Result<Row> {
        self.plugin.add_row(unit, cells).await
    }

    /// Insert `rows` in one batch; transactional backends write all of them or none.
    pub async fn add_rows(&self, unit: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let requested = rows.len();
        let written = self.plugin.bulk_add_rows(unit, rows).await?;
        debug!(event = "facade.add_rows", unit = %unit, rows = requested);
        Ok(written)
    }

    pub async fn mutate_row(&self, unit: &str, mutation: RowMutation) -> Result<MutationOutcome> {
        let outcome = match mutation {
            RowMutation::Add(cells) => MutationOutcome::Added(self.plugin.add_row(unit, cells).await?),
            RowMutation::Update { identity, cells } => {
                MutationOutcome::Updated(self.plugin.update_row(unit, &identity, cells).await?)
            }
            RowMutation::Delete(identity) => {
                self.plugin.delete_row(unit, &identity).await?;
                MutationOutcome::Deleted
            }
        };
        debug!(event = "facade.mutate_row", unit = %unit, outcome = ?outcome_label(&outcome));
        Ok(outcome)
    }

    pub async fn clear_unit(&self, unit: &str) -> Result<u64> {
        let removed = self.plugin.clear_unit(unit).await?;
        info!(event = "facade.clear_unit", unit = %unit, rows = removed);
        Ok(removed)
    }

    /// Fetch units and foreign keys and build a fresh relationship graph.
    pub async fn schema_snapshot(&self) -> Result<SchemaSnapshot> {
        resolver::resolve(self).await
    }

    /// Write the rows of `unit` matching `conditions` as CSV; returns rows written.
    pub async fn export_csv<W: Write + Send>(
        &self,
        unit: &str,
        conditions: &[Condition],
        writer: W,
    ) -> Result<u64> {
        self.check_conditions(conditions)?;
        export::write_csv(self, unit, conditions, writer).await
    }
}

fn outcome_label(outcome: &MutationOutcome) -> &'static str {
    match outcome {
        MutationOutcome::Added(_) => "added",
        MutationOutcome::Updated(_) => "updated",
        MutationOutcome::Deleted => "deleted",
    }
}
