use std::collections::BTreeMap;

use whodb_core::{ForeignKeyEdge, Row, StorageUnit, Value};

use crate::errors::{GenerationError, Result};

/// Rows written during one run, handed out to children round-robin.
///
/// Every foreign key group keeps its own cursor, so two references from the
/// same child unit to the same parent advance independently. Groups that
/// together form the child's primary key walk the cross product of their
/// parents instead, so no key tuple repeats.
#[derive(Debug, Default)]
pub struct ForeignContext {
    written: BTreeMap<String, Vec<Row>>,
    cursor: BTreeMap<String, usize>,
    combination: BTreeMap<String, usize>,
}

impl ForeignContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row as returned by the backend, including assigned keys.
    pub fn ingest(&mut self, unit: &str, row: Row) {
        self.written.entry(unit.to_string()).or_default().push(row);
    }

    /// Fill the child columns of one foreign key group from a single parent row.
    ///
    /// All edges in `group` must share the same parent unit; composite keys
    /// therefore always point at one existing parent.
    pub fn assign(&mut self, group: &[&ForeignKeyEdge], row: &mut Row) -> Result<()> {
        let Some(first) = group.first() else {
            return Ok(());
        };
        let parents = parent_rows(&self.written, first)?;
        let cursor = self.cursor.entry(first.group_key()).or_insert(0);
        let parent = &parents[*cursor % parents.len()];
        *cursor += 1;
        copy_keys(group, parent, row)
    }

    /// Fill several groups that make up `child`'s primary key with the next
    /// unused combination of parent rows.
    ///
    /// The first group varies fastest. Fails once every combination of the
    /// rows written to the parents has been handed out.
    pub fn assign_joint(
        &mut self,
        child: &str,
        groups: &[&[&ForeignKeyEdge]],
        row: &mut Row,
    ) -> Result<()> {
        let mut pools = Vec::with_capacity(groups.len());
        for group in groups {
            if let Some(first) = group.first() {
                pools.push((*group, parent_rows(&self.written, first)?));
            }
        }
        let combinations = pools
            .iter()
            .fold(1_usize, |acc, (_, parents)| acc.saturating_mul(parents.len()));

        let counter = self.combination.entry(child.to_string()).or_insert(0);
        if *counter >= combinations {
            return Err(GenerationError::Unsupported(format!(
                "'{child}' has used all {combinations} parent combinations of its primary key"
            )));
        }
        let mut index = *counter;
        *counter += 1;

        for (group, parents) in pools {
            let parent = &parents[index % parents.len()];
            index /= parents.len();
            copy_keys(group, parent, row)?;
        }
        Ok(())
    }
}

fn parent_rows<'a>(
    written: &'a BTreeMap<String, Vec<Row>>,
    edge: &ForeignKeyEdge,
) -> Result<&'a [Row]> {
    written
        .get(&edge.to_unit)
        .filter(|rows| !rows.is_empty())
        .map(Vec::as_slice)
        .ok_or_else(|| {
            GenerationError::Unsupported(format!(
                "no rows were written to '{}' before '{}'",
                edge.to_unit, edge.from_unit
            ))
        })
}

fn copy_keys(group: &[&ForeignKeyEdge], parent: &Row, row: &mut Row) -> Result<()> {
    for edge in group {
        let value = parent.get(&edge.to_column).cloned().unwrap_or(Value::Null);
        if value.is_null() {
            return Err(GenerationError::Unsupported(format!(
                "parent '{}' returned no value for referenced column '{}'",
                edge.to_unit, edge.to_column
            )));
        }
        row.set(edge.from_column.clone(), value);
    }
    Ok(())
}

/// Indices of the groups that jointly form `unit`'s primary key.
///
/// Empty unless every primary-key column is filled by a foreign key and the
/// key spans at least two groups; a single group is already covered by the
/// one-to-one sizing of its parent.
pub fn joint_key(unit: &StorageUnit, groups: &[Vec<&ForeignKeyEdge>]) -> Vec<usize> {
    let primary: Vec<&str> = unit
        .columns
        .iter()
        .filter(|column| column.primary_key)
        .map(|column| column.name.as_str())
        .collect();
    if primary.is_empty() {
        return Vec::new();
    }
    let in_key = |edge: &&ForeignKeyEdge| primary.contains(&edge.from_column.as_str());
    let covered = primary.iter().all(|name| {
        groups
            .iter()
            .flatten()
            .any(|edge| edge.from_column == *name)
    });
    let members: Vec<usize> = groups
        .iter()
        .enumerate()
        .filter(|(_, group)| group.iter().any(in_key))
        .map(|(idx, _)| idx)
        .collect();
    if covered && members.len() > 1 {
        members
    } else {
        Vec::new()
    }
}

/// Group the outgoing edges of a unit by constraint, keeping discovery order.
pub fn group_edges<'a>(edges: &[&'a ForeignKeyEdge]) -> Vec<Vec<&'a ForeignKeyEdge>> {
    let mut groups: Vec<(String, Vec<&'a ForeignKeyEdge>)> = Vec::new();
    for edge in edges.iter().copied() {
        let key = edge.group_key();
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(edge),
            None => groups.push((key, vec![edge])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

#[cfg(test)]
mod tests {
    use whodb_core::{Category, Column};

    use super::*;

    #[test]
    fn round_robin_cycles_through_parents() {
        let mut context = ForeignContext::new();
        for id in 1..=2 {
            context.ingest("customers", Row::new().with("id", id));
        }
        let edge = ForeignKeyEdge::new("orders", "customer_id", "customers", "id");
        let picked: Vec<Value> = (0..4)
            .map(|_| {
                let mut row = Row::new();
                context.assign(&[&edge], &mut row).unwrap();
                row.get("customer_id").cloned().unwrap()
            })
            .collect();
        assert_eq!(
            picked,
            vec![Value::Int(1), Value::Int(2), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn composite_key_comes_from_one_parent() {
        let mut context = ForeignContext::new();
        context.ingest("accounts", Row::new().with("id", 1).with("region", "eu"));
        context.ingest("accounts", Row::new().with("id", 2).with("region", "us"));
        let id = ForeignKeyEdge::new("entries", "account_id", "accounts", "id").named("fk");
        let region =
            ForeignKeyEdge::new("entries", "account_region", "accounts", "region").named("fk");
        let groups = group_edges(&[&id, &region]);
        assert_eq!(groups.len(), 1);

        let mut row = Row::new();
        context.assign(&groups[0], &mut row).unwrap();
        context.assign(&groups[0], &mut row).unwrap();
        assert_eq!(row.get("account_id"), Some(&Value::Int(2)));
        assert_eq!(row.get("account_region"), Some(&Value::Text("us".to_string())));
    }

    #[test]
    fn joint_key_walks_the_cross_product() {
        let mut context = ForeignContext::new();
        for id in 1..=2 {
            context.ingest("orders", Row::new().with("id", id));
        }
        context.ingest("products", Row::new().with("id", 10));
        let order = ForeignKeyEdge::new("order_products", "order_id", "orders", "id");
        let product = ForeignKeyEdge::new("order_products", "product_id", "products", "id");
        let groups: [&[&ForeignKeyEdge]; 2] = [&[&order], &[&product]];

        let mut pairs = Vec::new();
        for _ in 0..2 {
            let mut row = Row::new();
            context.assign_joint("order_products", &groups, &mut row).unwrap();
            pairs.push((
                row.get("order_id").cloned().unwrap(),
                row.get("product_id").cloned().unwrap(),
            ));
        }
        assert_eq!(
            pairs,
            vec![
                (Value::Int(1), Value::Int(10)),
                (Value::Int(2), Value::Int(10))
            ]
        );
        let err = context
            .assign_joint("order_products", &groups, &mut Row::new())
            .unwrap_err();
        assert!(err.to_string().contains("all 2 parent combinations"), "{err}");
    }

    #[test]
    fn joint_key_needs_every_primary_column_from_foreign_keys() {
        let order = ForeignKeyEdge::new("order_products", "order_id", "orders", "id");
        let product = ForeignKeyEdge::new("order_products", "product_id", "products", "id");
        let groups = group_edges(&[&order, &product]);
        let junction = StorageUnit {
            name: "order_products".to_string(),
            category: Category::Sql,
            kind: "BASE TABLE".to_string(),
            row_count: None,
            size: None,
            columns: vec![
                Column::new("order_id", "integer").primary(),
                Column::new("product_id", "integer").primary(),
            ],
        };
        assert_eq!(joint_key(&junction, &groups), vec![0, 1]);

        let mut surrogate = junction.clone();
        surrogate.columns = vec![
            Column::new("id", "serial").primary().auto(),
            Column::new("order_id", "integer"),
            Column::new("product_id", "integer"),
        ];
        assert!(joint_key(&surrogate, &groups).is_empty());
    }

    #[test]
    fn missing_parent_rows_fail() {
        let mut context = ForeignContext::new();
        let edge = ForeignKeyEdge::new("orders", "customer_id", "customers", "id");
        assert!(context.assign(&[&edge], &mut Row::new()).is_err());
    }
}
