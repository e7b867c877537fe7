use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use whodb_core::{Cardinality, Category, WriteMode};
use whodb_engine::SchemaSnapshot;

use crate::errors::{GenerationError, Result};
use crate::foreign::{group_edges, joint_key};
use crate::model::{GenerateOptions, GenerationPlan, PlanStep};

/// Build a parents-first plan for `requested` rows of `target`.
///
/// The plan holds the target and every transitive parent. Parent quotas are
/// derived children-first: a one-to-one edge needs as many parent rows as the
/// child has, any other edge needs `ceil(child / children_per_parent)`, and a
/// parent referenced by several children takes the largest need.
pub fn plan_units(
    snapshot: &SchemaSnapshot,
    target: &str,
    requested: u64,
    mode: WriteMode,
    options: &GenerateOptions,
) -> Result<GenerationPlan> {
    if options.is_disabled(target) {
        return Err(GenerationError::Disabled(target.to_string()));
    }
    let rows = options.clamp_rows(requested);

    let unit = snapshot.unit(target)?;
    check_category(unit.category, &unit.name, unit.columns.is_empty())?;
    if unit.is_view() {
        return Err(GenerationError::Unsupported(format!(
            "'{}' is a {} and cannot receive rows",
            unit.name,
            unit.kind.to_lowercase()
        )));
    }

    let graph = &snapshot.graph;
    let mut members = vec![target.to_string()];
    members.extend(graph.ancestors(target)?);
    for member in &members {
        if options.is_disabled(member) {
            return Err(GenerationError::Disabled(member.clone()));
        }
    }
    let order = graph.topological_order(&members)?;

    let mut quotas: BTreeMap<&str, u64> = BTreeMap::new();
    quotas.insert(target, rows);
    let per_parent = options.children_per_parent.max(1);
    for child in order.iter().rev() {
        let child_rows = quotas.get(child.as_str()).copied().unwrap_or(1);
        let mut seen = BTreeSet::new();
        for edge in graph.edges_from(child) {
            if !seen.insert(edge.group_key()) {
                continue;
            }
            let need = match edge.cardinality {
                Cardinality::OneToOne => child_rows,
                _ => child_rows.div_ceil(per_parent),
            };
            let entry = quotas.entry(edge.to_unit.as_str()).or_insert(1);
            *entry = (*entry).max(need.max(1));
        }
        widen_joint_parents(snapshot, child, child_rows, &mut quotas)?;
    }

    let steps: Vec<PlanStep> = order
        .iter()
        .map(|unit| PlanStep {
            unit: unit.clone(),
            rows: quotas.get(unit.as_str()).copied().unwrap_or(1),
        })
        .collect();

    debug!(
        event = "mockdata.plan",
        target = %target,
        rows = rows,
        units = steps.len(),
        mode = %mode
    );

    Ok(GenerationPlan {
        target: target.to_string(),
        rows_requested: requested,
        rows,
        mode,
        steps,
    })
}

/// Grow the parents of a primary key made of several foreign keys until their
/// row counts multiply to at least `child_rows`, so every child gets a
/// distinct key tuple. The smallest parent grows first.
fn widen_joint_parents<'a>(
    snapshot: &'a SchemaSnapshot,
    child: &str,
    child_rows: u64,
    quotas: &mut BTreeMap<&'a str, u64>,
) -> Result<()> {
    let unit = snapshot.unit(child)?;
    let edges = snapshot.graph.edges_from(child);
    let groups = group_edges(&edges);
    let parents: Vec<&'a str> = joint_key(unit, &groups)
        .into_iter()
        .map(|idx| groups[idx][0].to_unit.as_str())
        .collect();

    while key_space(&parents, quotas) < child_rows {
        let Some(smallest) = parents
            .iter()
            .copied()
            .min_by_key(|parent| quotas.get(parent).copied().unwrap_or(1))
        else {
            break;
        };
        *quotas.entry(smallest).or_insert(1) += 1;
    }
    Ok(())
}

/// Distinct key tuples the parents can supply; unbounded without a joint key.
fn key_space<'a>(parents: &[&'a str], quotas: &BTreeMap<&'a str, u64>) -> u64 {
    if parents.is_empty() {
        return u64::MAX;
    }
    parents.iter().fold(1_u64, |acc, parent| {
        acc.saturating_mul(quotas.get(parent).copied().unwrap_or(1))
    })
}

fn check_category(category: Category, unit: &str, schemaless: bool) -> Result<()> {
    match category {
        Category::KeyValue => Err(GenerationError::Unsupported(format!(
            "mock data is not available for key-value unit '{unit}'"
        ))),
        Category::Document if schemaless => Err(GenerationError::Unsupported(format!(
            "collection '{unit}' declares no fields to generate"
        ))),
        _ => Ok(()),
    }
}
