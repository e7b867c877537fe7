use tracing::debug;

use whodb_core::{Error, RelationshipGraph, Result, StorageUnit};

use crate::facade::Facade;

/// Units and foreign-key graph captured by one resolution pass.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub units: Vec<StorageUnit>,
    pub graph: RelationshipGraph,
}

impl SchemaSnapshot {
    pub fn unit(&self, name: &str) -> Result<&StorageUnit> {
        self.units
            .iter()
            .find(|unit| unit.name == name)
            .ok_or_else(|| Error::NotFound(format!("storage unit '{name}'")))
    }
}

/// Build the relationship graph from plugin metadata.
pub async fn resolve(facade: &Facade) -> Result<SchemaSnapshot> {
    let units = facade.list_units().await?;
    let mut edges = Vec::new();
    for unit in &units {
        edges.extend(facade.relationships(&unit.name).await?);
    }
    let graph = RelationshipGraph::new(units.iter().map(|unit| unit.name.clone()), edges);
    let summary = graph.summary();
    debug!(event = "resolver.graph", nodes = summary.nodes, edges = summary.edges);
    Ok(SchemaSnapshot { units, graph })
}
