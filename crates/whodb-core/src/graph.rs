use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::ForeignKeyEdge;

/// Node/edge counts of a relationship graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Foreign-key graph over storage units.
///
/// Nodes live in an arena indexed by insertion order; edges are stored once and
/// referenced by index from both endpoints. The graph is immutable after
/// construction; plans derive their own ordered lists from it.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    nodes: Vec<String>,
    index: BTreeMap<String, usize>,
    edges: Vec<ForeignKeyEdge>,
    /// Per node: edges where the node is the referencing (child) side.
    outgoing: Vec<Vec<usize>>,
    /// Per node: edges where the node is the referenced (parent) side.
    incoming: Vec<Vec<usize>>,
}

impl RelationshipGraph {
    /// Build a graph from unit names and edges. Units only named by an edge
    /// are added as nodes too; duplicate edges are dropped.
    pub fn new<I, S>(units: I, edges: impl IntoIterator<Item = ForeignKeyEdge>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::default();
        for unit in units {
            graph.intern(unit.into());
        }

        let mut seen = BTreeSet::new();
        for edge in edges {
            let signature = (
                edge.from_unit.clone(),
                edge.from_column.clone(),
                edge.to_unit.clone(),
                edge.to_column.clone(),
            );
            if !seen.insert(signature) {
                continue;
            }
            let from = graph.intern(edge.from_unit.clone());
            let to = graph.intern(edge.to_unit.clone());
            let edge_idx = graph.edges.len();
            graph.edges.push(edge);
            graph.outgoing[from].push(edge_idx);
            graph.incoming[to].push(edge_idx);
        }
        graph
    }

    fn intern(&mut self, name: String) -> usize {
        if let Some(idx) = self.index.get(&name) {
            return *idx;
        }
        let idx = self.nodes.len();
        self.index.insert(name.clone(), idx);
        self.nodes.push(name);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        idx
    }

    fn position(&self, unit: &str) -> Result<usize> {
        self.index
            .get(unit)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("storage unit '{unit}'")))
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
        }
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.index.contains_key(unit)
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn edges(&self) -> &[ForeignKeyEdge] {
        &self.edges
    }

    /// Edges where `unit` is the referencing side.
    pub fn edges_from(&self, unit: &str) -> Vec<&ForeignKeyEdge> {
        match self.index.get(unit) {
            Some(idx) => self.outgoing[*idx].iter().map(|e| &self.edges[*e]).collect(),
            None => Vec::new(),
        }
    }

    /// Edges where `unit` is the referenced side.
    pub fn edges_into(&self, unit: &str) -> Vec<&ForeignKeyEdge> {
        match self.index.get(unit) {
            Some(idx) => self.incoming[*idx].iter().map(|e| &self.edges[*e]).collect(),
            None => Vec::new(),
        }
    }

    /// Transitive parents of `target` in breadth-first discovery order.
    ///
    /// The target itself is never part of the result, even when a cycle leads
    /// back to it; cycles are reported by [`Self::topological_order`].
    pub fn ancestors(&self, target: &str) -> Result<Vec<String>> {
        let start = self.position(target)?;
        let mut visited = vec![false; self.nodes.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut order = Vec::new();

        while let Some(node) = queue.pop_front() {
            for edge_idx in &self.outgoing[node] {
                let parent = self.index[&self.edges[*edge_idx].to_unit];
                if !visited[parent] {
                    visited[parent] = true;
                    order.push(self.nodes[parent].clone());
                    queue.push_back(parent);
                }
            }
        }
        Ok(order)
    }

    /// Order `subset` so every referenced unit precedes its referencing units.
    ///
    /// Ties are broken by position in `subset`, so a BFS discovery list yields a
    /// stable order. Edges leaving the subset are ignored. Any cycle inside the
    /// subset, including a self-reference, fails with `CycleDetected`.
    pub fn topological_order(&self, subset: &[String]) -> Result<Vec<String>> {
        let mut rank: BTreeMap<usize, usize> = BTreeMap::new();
        for (pos, unit) in subset.iter().enumerate() {
            let idx = self.position(unit)?;
            rank.entry(idx).or_insert(pos);
        }

        let mut indegree: BTreeMap<usize, usize> = rank.keys().map(|idx| (*idx, 0)).collect();
        for idx in rank.keys() {
            for edge_idx in &self.outgoing[*idx] {
                let edge = &self.edges[*edge_idx];
                let parent = self.index[&edge.to_unit];
                if parent == *idx {
                    return Err(Error::CycleDetected(vec![
                        edge.from_unit.clone(),
                        edge.to_unit.clone(),
                    ]));
                }
                if rank.contains_key(&parent) {
                    *indegree.entry(*idx).or_insert(0) += 1;
                }
            }
        }

        // Ready set keyed by subset position for stable tie breaking.
        let mut ready: BTreeSet<(usize, usize)> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(idx, _)| (rank[idx], *idx))
            .collect();

        let mut order = Vec::with_capacity(rank.len());
        while let Some(entry) = ready.pop_first() {
            let node = entry.1;
            order.push(self.nodes[node].clone());
            for edge_idx in &self.incoming[node] {
                let child = self.index[&self.edges[*edge_idx].from_unit];
                if let Some(count) = indegree.get_mut(&child) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert((rank[&child], child));
                    }
                }
            }
        }

        if order.len() == rank.len() {
            Ok(order)
        } else {
            let remaining: BTreeSet<usize> = indegree
                .into_iter()
                .filter_map(|(idx, count)| (count > 0).then_some(idx))
                .collect();
            Err(Error::CycleDetected(self.cycle_path(&remaining)))
        }
    }

    /// Walk parent edges inside `remaining` until a node repeats.
    fn cycle_path(&self, remaining: &BTreeSet<usize>) -> Vec<String> {
        let Some(start) = remaining.first().copied() else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let next = self.outgoing[current]
                .iter()
                .map(|edge_idx| self.index[&self.edges[*edge_idx].to_unit])
                .find(|parent| remaining.contains(parent));
            let Some(next) = next else {
                break;
            };
            if let Some(pos) = path.iter().position(|node| *node == next) {
                let mut cycle: Vec<String> =
                    path[pos..].iter().map(|idx| self.nodes[*idx].clone()).collect();
                cycle.push(self.nodes[next].clone());
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.into_iter().map(|idx| self.nodes[idx].clone()).collect()
    }

    /// Units outside `subset` that reference `unit`.
    pub fn children_outside(&self, unit: &str, subset: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for edge in self.edges_into(unit) {
            if !subset.contains(&edge.from_unit) && !out.contains(&edge.from_unit) {
                out.push(edge.from_unit.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn shop() -> RelationshipGraph {
        RelationshipGraph::new(
            ["customers", "orders", "products", "order_items", "audit"],
            [
                ForeignKeyEdge::new("orders", "customer_id", "customers", "id"),
                ForeignKeyEdge::new("order_items", "order_id", "orders", "id"),
                ForeignKeyEdge::new("order_items", "product_id", "products", "id"),
                ForeignKeyEdge::new("order_items", "order_id", "orders", "id"),
            ],
        )
    }

    #[test]
    fn duplicate_edges_are_stored_once() {
        let summary = shop().summary();
        assert_eq!(summary.nodes, 5);
        assert_eq!(summary.edges, 3);
    }

    #[test]
    fn ancestors_follow_discovery_order() {
        let graph = shop();
        assert_eq!(
            graph.ancestors("order_items").unwrap(),
            names(&["orders", "products", "customers"])
        );
        assert!(graph.ancestors("customers").unwrap().is_empty());
        assert_eq!(
            graph.ancestors("missing").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn topological_order_puts_parents_first() {
        let graph = shop();
        let subset = names(&["order_items", "orders", "products", "customers"]);
        let order = graph.topological_order(&subset).unwrap();
        assert_eq!(
            order,
            names(&["products", "customers", "orders", "order_items"])
        );

        for edge in graph.edges() {
            let from = order.iter().position(|u| *u == edge.from_unit).unwrap();
            let to = order.iter().position(|u| *u == edge.to_unit).unwrap();
            assert!(to < from);
        }
    }

    #[test]
    fn order_ignores_edges_leaving_subset() {
        let graph = shop();
        let order = graph.topological_order(&names(&["orders"])).unwrap();
        assert_eq!(order, names(&["orders"]));
    }

    #[test]
    fn cycles_are_reported_with_path() {
        let graph = RelationshipGraph::new(
            ["a", "b", "c"],
            [
                ForeignKeyEdge::new("a", "b_id", "b", "id"),
                ForeignKeyEdge::new("b", "c_id", "c", "id"),
                ForeignKeyEdge::new("c", "a_id", "a", "id"),
            ],
        );
        let err = graph
            .topological_order(&names(&["a", "b", "c"]))
            .unwrap_err();
        match err {
            Error::CycleDetected(path) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let graph = RelationshipGraph::new(
            ["employees"],
            [ForeignKeyEdge::new("employees", "manager_id", "employees", "id")],
        );
        assert!(graph.ancestors("employees").unwrap().is_empty());
        let err = graph
            .topological_order(&names(&["employees"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
    }

    #[test]
    fn children_outside_subset_are_listed() {
        let graph = shop();
        let subset = names(&["orders", "customers"]);
        assert_eq!(
            graph.children_outside("orders", &subset),
            names(&["order_items"])
        );
        assert!(graph.children_outside("customers", &subset).is_empty());
    }
}
