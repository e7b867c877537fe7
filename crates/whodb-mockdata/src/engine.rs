use std::collections::{BTreeMap, BTreeSet, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use whodb_core::{
    CanonicalType, Column, Error, ForeignKeyEdge, Page, RelationshipGraph, Row, Sort,
    StorageUnit, Value, WriteMode,
};
use whodb_engine::Facade;

use crate::errors::{GenerationError, Result};
use crate::foreign::{ForeignContext, group_edges, joint_key};
use crate::generators;
use crate::model::{GenerateOptions, GenerationPlan, GenerationReport, NullPolicy, UnitReport};
use crate::planner;

/// Writes planned mock rows through a [`Facade`].
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    facade: Facade,
    options: GenerateOptions,
}

impl GenerationEngine {
    pub fn new(facade: Facade, options: GenerateOptions) -> Self {
        Self { facade, options }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Resolve the schema and compute the plan without writing anything.
    pub async fn plan(&self, target: &str, rows: u64, mode: WriteMode) -> Result<GenerationPlan> {
        if self.options.is_disabled(target) {
            return Err(GenerationError::Disabled(target.to_string()));
        }
        let snapshot = self.facade.schema_snapshot().await?;
        planner::plan_units(&snapshot, target, rows, mode, &self.options)
    }

    /// Generate `rows` rows of `target` plus whatever its parents need.
    ///
    /// Units are written one at a time, parents first. The report is only
    /// returned when every unit succeeded; rows written before a failure
    /// stay in the store.
    pub async fn generate(
        &self,
        target: &str,
        rows: u64,
        mode: WriteMode,
    ) -> Result<GenerationReport> {
        if self.options.is_disabled(target) {
            return Err(GenerationError::Disabled(target.to_string()));
        }
        let snapshot = self.facade.schema_snapshot().await?;
        let plan = planner::plan_units(&snapshot, target, rows, mode, &self.options)?;
        let seed = self.options.seed.unwrap_or_else(rand::random);

        info!(
            event = "mockdata.start",
            target = %target,
            rows = plan.rows,
            units = plan.steps.len(),
            mode = %mode,
            seed = seed
        );

        let mut report = GenerationReport {
            target: plan.target.clone(),
            rows_requested: plan.rows_requested,
            rows_generated: 0,
            units: plan
                .steps
                .iter()
                .map(|step| UnitReport {
                    unit: step.unit.clone(),
                    rows_planned: step.rows,
                    rows_written: 0,
                    rows_cleared: 0,
                    retries: 0,
                })
                .collect(),
            generator_usage: BTreeMap::new(),
        };

        if mode == WriteMode::Overwrite {
            let members = plan.units();
            self.preflight(&snapshot.graph, &members).await?;
            for (idx, step) in plan.steps.iter().enumerate().rev() {
                let cleared = self.facade.clear_unit(&step.unit).await?;
                report.units[idx].rows_cleared = cleared;
            }
        }

        let mut foreign = ForeignContext::new();
        for (idx, step) in plan.steps.iter().enumerate() {
            let unit = snapshot.unit(&step.unit)?;
            let mut rng = ChaCha8Rng::seed_from_u64(unit_seed(seed, &step.unit));
            let mut writer = UnitWriter {
                unit,
                graph: &snapshot.graph,
                options: &self.options,
                rng: &mut rng,
                report: &mut report,
                retries: 0,
            };
            let written = writer.write(&self.facade, step.rows, &mut foreign).await?;
            let retries = writer.retries;
            report.units[idx].rows_written = written;
            report.units[idx].retries = retries;
            debug!(
                event = "mockdata.unit",
                unit = %step.unit,
                rows = written,
                retries = retries
            );
        }

        report.rows_generated = report
            .unit(target)
            .map(|unit| unit.rows_written)
            .unwrap_or_default();
        info!(
            event = "mockdata.done",
            target = %target,
            rows = report.rows_generated,
            units = report.units.len()
        );
        Ok(report)
    }

    /// Refuse to clear plan units that rows outside the plan still reference.
    async fn preflight(&self, graph: &RelationshipGraph, members: &[String]) -> Result<()> {
        for unit in members {
            for child in graph.children_outside(unit, members) {
                let rows = self.facade.count(&child, &[]).await?;
                if rows > 0 {
                    return Err(Error::constraint(
                        unit.clone(),
                        format!(
                            "'{child}' holds {rows} row(s) referencing '{unit}' and is not part \
                             of this generation; clear it first or use append mode"
                        ),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }
}

struct UnitWriter<'a> {
    unit: &'a StorageUnit,
    graph: &'a RelationshipGraph,
    options: &'a GenerateOptions,
    rng: &'a mut ChaCha8Rng,
    report: &'a mut GenerationReport,
    retries: u64,
}

impl UnitWriter<'_> {
    async fn write(
        &mut self,
        facade: &Facade,
        rows: u64,
        foreign: &mut ForeignContext,
    ) -> Result<u64> {
        let unit = self.unit;
        let graph = self.graph;
        let edges = graph.edges_from(&unit.name);
        let groups = group_edges(&edges);
        let joint = joint_key(unit, &groups);
        let joint_groups: Vec<&[&ForeignKeyEdge]> =
            joint.iter().map(|&idx| groups[idx].as_slice()).collect();
        let fk_columns: BTreeSet<&str> =
            edges.iter().map(|edge| edge.from_column.as_str()).collect();

        let mut sequences: BTreeMap<&str, i64> = BTreeMap::new();
        for column in &unit.columns {
            if needs_sequence(column) && !fk_columns.contains(column.name.as_str()) {
                let next = current_max(facade, &unit.name, &column.name).await? + 1;
                sequences.insert(column.name.as_str(), next);
            }
        }

        let mut uniques = UniqueSet::default();
        let mut written = 0;
        for _ in 0..rows {
            let mut row = Row::new();
            for (idx, group) in groups.iter().enumerate() {
                if !joint.contains(&idx) {
                    foreign.assign(group, &mut row)?;
                }
            }
            if !joint_groups.is_empty() {
                foreign.assign_joint(&unit.name, &joint_groups, &mut row)?;
            }
            for column in &unit.columns {
                if column.is_backend_assigned() || fk_columns.contains(column.name.as_str()) {
                    continue;
                }
                if let Some(next) = sequences.get_mut(column.name.as_str()) {
                    row.set(column.name.clone(), next_key(&unit.name, column, next)?);
                    self.report.record_generator_usage("sequence");
                    continue;
                }
                if self.leave_null(column) {
                    row.set(column.name.clone(), Value::Null);
                    continue;
                }
                let value = self.unique_value(column, &mut uniques)?;
                row.set(column.name.clone(), value);
            }

            let stored = facade.add_row(&unit.name, row).await?;
            foreign.ingest(&unit.name, stored);
            written += 1;
        }
        Ok(written)
    }

    fn leave_null(&mut self, column: &Column) -> bool {
        match self.options.null_policy {
            NullPolicy::Probability(p) if column.nullable && !column.primary_key => {
                self.rng.random_bool(p.clamp(0.0, 1.0))
            }
            _ => false,
        }
    }

    fn unique_value(&mut self, column: &Column, uniques: &mut UniqueSet) -> Result<Value> {
        let must_be_unique = column.unique || column.primary_key;
        let max_attempts = self.options.max_attempts_row.max(1);
        let mut attempts = 0;
        loop {
            let generated = generators::generate(column, self.rng);
            if !must_be_unique || uniques.insert(&column.name, &generated.value) {
                self.report.record_generator_usage(generated.generator);
                return Ok(generated.value);
            }
            attempts += 1;
            self.retries += 1;
            if attempts >= max_attempts {
                return Err(GenerationError::UniqueExhausted {
                    unit: self.unit.name.clone(),
                    column: column.name.clone(),
                    attempts,
                });
            }
        }
    }
}

/// Values already used per unique column within one unit of a run.
#[derive(Debug, Default)]
struct UniqueSet {
    seen: HashSet<(String, String)>,
}

impl UniqueSet {
    fn insert(&mut self, column: &str, value: &Value) -> bool {
        self.seen.insert((column.to_string(), value.key()))
    }
}

/// Client-assigned integer keys continue after the current maximum.
fn needs_sequence(column: &Column) -> bool {
    (column.primary_key || column.unique)
        && !column.is_backend_assigned()
        && column.allowed_values.is_empty()
        && matches!(column.canonical, CanonicalType::Integer { .. })
}

async fn current_max(facade: &Facade, unit: &str, column: &str) -> Result<i64> {
    let page = facade
        .query(unit, &[], &[Sort::desc(column)], Some(Page::first(1)))
        .await?;
    Ok(page
        .rows
        .first()
        .and_then(|row| row.get(column))
        .and_then(Value::as_i64)
        .unwrap_or(0)
        .max(0))
}

fn next_key(unit: &str, column: &Column, next: &mut i64) -> Result<Value> {
    let value = *next;
    if let Some((_, high)) = column.canonical.integer_bounds()
        && i128::from(value) > high
    {
        return Err(Error::constraint(
            unit,
            format!("no free value left in the range of '{}'", column.name),
        )
        .into());
    }
    *next += 1;
    Ok(Value::Int(value))
}

/// Per-unit seed so a unit's values do not depend on the plan around it.
fn unit_seed(seed: u64, unit: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in unit.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_seeds_differ_per_unit() {
        assert_ne!(unit_seed(1, "orders"), unit_seed(1, "customers"));
        assert_eq!(unit_seed(9, "orders"), unit_seed(9, "orders"));
    }

    #[test]
    fn sequences_cover_client_assigned_integer_keys() {
        assert!(needs_sequence(&Column::new("id", "integer").primary()));
        assert!(!needs_sequence(&Column::new("id", "serial").primary().auto()));
        assert!(!needs_sequence(&Column::new("code", "text").primary()));
        assert!(!needs_sequence(&Column::new("qty", "integer")));
    }

    #[test]
    fn next_key_respects_integer_width() {
        let column = Column::new("id", "smallint").primary();
        let mut next = 32_767;
        assert_eq!(next_key("t", &column, &mut next).unwrap(), Value::Int(32_767));
        assert!(next_key("t", &column, &mut next).is_err());
    }

    #[test]
    fn unique_set_tracks_per_column() {
        let mut set = UniqueSet::default();
        assert!(set.insert("a", &Value::Int(1)));
        assert!(!set.insert("a", &Value::Int(1)));
        assert!(set.insert("b", &Value::Int(1)));
    }
}
