//! The working graph: an arena of nodes keyed by address and edges keyed by
//! `(from, to, tx_hash)`, not a pointer graph with back-references (§9).
//! Consolidation rewrites edge keys in place rather than swinging pointers.

use crate::model::{Address, Edge, Node};
use std::collections::HashMap;

pub type EdgeKey = (Address, Address, String);

#[derive(Debug, Default)]
pub struct WorkingGraph {
    nodes: HashMap<Address, Node>,
    edges: HashMap<EdgeKey, Edge>,
    next_insertion_order: u64,
}

impl WorkingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the node if absent, returning whether it was newly created.
    pub fn ensure_node(&mut self, address: &Address, depth: u32) -> bool {
        if self.nodes.contains_key(address) {
            return false;
        }
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.nodes
            .insert(address.clone(), Node::new(address.clone(), depth, order));
        true
    }

    pub fn node(&self, address: &str) -> Option<&Node> {
        self.nodes.get(address)
    }

    pub fn node_mut(&mut self, address: &str) -> Option<&mut Node> {
        self.nodes.get_mut(address)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Inserts an edge; a duplicate `(from, to, tx_hash)` is a no-op, per
    /// the graph's uniqueness invariant.
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        let key = (edge.from.clone(), edge.to.clone(), edge.tx_hash.clone());
        if self.edges.contains_key(&key) {
            return false;
        }
        self.edges.insert(key, edge);
        true
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.values_mut()
    }

    pub fn out_degree(&self, address: &str) -> usize {
        self.edges.values().filter(|e| e.from == address).count()
    }

    pub fn remove_node(&mut self, address: &str) {
        self.nodes.remove(address);
        self.edges
            .retain(|(from, to, _), _| from != address && to != address);
    }

    /// Rewrites every edge touching `from_address` so it instead touches
    /// `to_address`, dropping the resulting self-loops. Used by entity
    /// consolidation (§4.5) to redirect a merged address's edges onto the
    /// chosen master without visiting every predecessor/successor by hand.
    pub fn rewrite_address(&mut self, from_address: &Address, to_address: &Address) {
        let keys: Vec<EdgeKey> = self
            .edges
            .keys()
            .filter(|(f, t, _)| f == from_address || t == from_address)
            .cloned()
            .collect();

        for key in keys {
            let mut edge = self.edges.remove(&key).expect("key came from edges");
            if &edge.from == from_address {
                edge.from = to_address.clone();
            }
            if &edge.to == from_address {
                edge.to = to_address.clone();
            }
            if edge.from == edge.to {
                continue; // drop self-loop
            }
            let new_key = (edge.from.clone(), edge.to.clone(), edge.tx_hash.clone());
            self.edges.entry(new_key).or_insert(edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterReason;
    use rust_decimal::Decimal;

    fn edge(from: &str, to: &str, hash: &str) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
            tx_hash: hash.to_string(),
            value: Decimal::ONE,
            block_number: None,
            timestamp: None,
            gas_used: None,
            gas_price: None,
            priority_score: 0,
            filter_reason: FilterReason::FilteredTransaction,
            flow_percentage: None,
            importance: None,
        }
    }

    #[test]
    fn duplicate_edge_insert_is_noop() {
        let mut graph = WorkingGraph::new();
        assert!(graph.insert_edge(edge("a", "b", "0x1")));
        assert!(!graph.insert_edge(edge("a", "b", "0x1")));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn rewrite_drops_self_loops() {
        let mut graph = WorkingGraph::new();
        graph.insert_edge(edge("a", "b", "0x1"));
        graph.insert_edge(edge("b", "a", "0x2"));
        graph.rewrite_address(&"b".to_string(), &"a".to_string());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn insertion_order_is_monotone() {
        let mut graph = WorkingGraph::new();
        graph.ensure_node(&"a".to_string(), 0);
        graph.ensure_node(&"b".to_string(), 1);
        assert!(graph.node("a").unwrap().insertion_order < graph.node("b").unwrap().insertion_order);
    }
}
