//! Post-processing over a finished working graph (§4.5): dead-end pruning,
//! entity consolidation, flow-percentage annotation, and top-path
//! extraction. Each phase is deterministic and runs exactly once per job;
//! running the whole pass twice on its own output is a no-op (idempotent).

use crate::engine::WorkingGraph;
use crate::model::{Address, EntityKind, FlowImportance, TopPathEntry};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

pub struct PostProcessor;

impl PostProcessor {
    /// Runs all four phases in order over `graph`, using `stolen_amount` as
    /// the denominator for flow percentages, and returns the top-path report.
    pub fn run(
        graph: &mut WorkingGraph,
        stolen_amount: Decimal,
        seed_addresses: &[Address],
    ) -> Vec<TopPathEntry> {
        prune_dead_ends(graph, seed_addresses);
        consolidate_entities(graph);
        annotate_flows(graph, stolen_amount);
        extract_top_paths(graph)
    }
}

/// Iteratively removes zero-out-degree nodes with no termination reason and
/// an entity kind outside {CEX, DEX, Mixer}, re-running until a pass removes
/// nothing so a chain of dead ends prunes all the way back.
fn prune_dead_ends(graph: &mut WorkingGraph, seed_addresses: &[Address]) {
    loop {
        let candidates: Vec<Address> = graph
            .nodes()
            .filter(|node| !seed_addresses.contains(&node.address))
            .filter(|node| graph.out_degree(&node.address) == 0)
            .filter(|node| node.termination_reason.is_none())
            .filter(|node| {
                !matches!(
                    node.entity_kind,
                    EntityKind::Cex | EntityKind::Dex | EntityKind::Mixer
                )
            })
            .map(|node| node.address.clone())
            .collect();

        if candidates.is_empty() {
            break;
        }
        for address in &candidates {
            graph.remove_node(address);
        }
    }
}

/// Groups nodes by classifier-assigned friendly name and merges each group
/// of size >= 2 onto the member discovered first (lowest insertion order).
fn consolidate_entities(graph: &mut WorkingGraph) {
    let mut groups: HashMap<String, Vec<(Address, u64)>> = HashMap::new();
    for node in graph.nodes() {
        if let Some(name) = &node.friendly_name {
            groups
                .entry(name.clone())
                .or_default()
                .push((node.address.clone(), node.insertion_order));
        }
    }

    for (_, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(|(_, order)| *order);
        let (master, _) = members[0].clone();
        let others: Vec<Address> = members[1..].iter().map(|(addr, _)| addr.clone()).collect();

        for other in &others {
            graph.rewrite_address(other, &master);
        }

        if let Some(master_node) = graph.node_mut(&master) {
            master_node.consolidated_addresses.extend(others.clone());
        }
        for other in &others {
            if let Some(node) = graph.node_mut(other) {
                node.consolidated_into = Some(master.clone());
            }
        }
        for other in &others {
            graph.remove_node(other);
        }
    }
}

fn annotate_flows(graph: &mut WorkingGraph, stolen_amount: Decimal) {
    if stolen_amount <= Decimal::ZERO {
        return;
    }
    for edge in graph.edges_mut() {
        let pct = (edge.value / stolen_amount * dec!(100))
            .to_f64()
            .unwrap_or(0.0);
        edge.flow_percentage = Some(pct);
        edge.importance = Some(if pct >= 10.0 {
            FlowImportance::Critical
        } else if pct >= 2.0 {
            FlowImportance::Significant
        } else {
            FlowImportance::Minor
        });
    }
}

/// Up to ten edges ranked by value descending; multi-hop paths are a
/// non-goal, so each entry is a single-hop projection (§4.5 phase 4).
fn extract_top_paths(graph: &WorkingGraph) -> Vec<TopPathEntry> {
    let mut edges: Vec<_> = graph.edges().collect();
    edges.sort_by(|a, b| b.value.cmp(&a.value));

    edges
        .into_iter()
        .take(10)
        .enumerate()
        .map(|(i, edge)| {
            let endpoint = graph.node(&edge.to);
            TopPathEntry {
                rank: i + 1,
                value: edge.value,
                flow_percentage: edge.flow_percentage.unwrap_or(0.0),
                hop_count: 1,
                final_endpoint_kind: endpoint.map(|n| n.entity_kind).unwrap_or(EntityKind::Unknown),
                final_endpoint_confidence: endpoint.map(|n| n.confidence).unwrap_or(0.0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, FilterReason, Node};

    fn node(address: &str, kind: EntityKind, friendly_name: Option<&str>, order: u64) -> Node {
        let mut n = Node::new(address.to_string(), 1, order);
        n.entity_kind = kind;
        n.friendly_name = friendly_name.map(|s| s.to_string());
        n
    }

    fn edge(from: &str, to: &str, hash: &str, value: Decimal) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
            tx_hash: hash.to_string(),
            value,
            block_number: None,
            timestamp: None,
            gas_used: None,
            gas_price: None,
            priority_score: 50,
            filter_reason: FilterReason::FilteredTransaction,
            flow_percentage: None,
            importance: None,
        }
    }

    fn graph_with_nodes(nodes: Vec<Node>) -> WorkingGraph {
        let mut graph = WorkingGraph::new();
        for n in nodes {
            graph.ensure_node(&n.address, n.depth_from_hack);
            if let Some(stored) = graph.node_mut(&n.address) {
                *stored = n;
            }
        }
        graph
    }

    #[test]
    fn dead_end_pruning_removes_leaf_but_protects_seed_addresses() {
        let mut graph = graph_with_nodes(vec![
            node("0xvictim", EntityKind::Victim, None, 0),
            node("0xhacker", EntityKind::Hacker, None, 1),
            node("0xleaf", EntityKind::Unknown, None, 2),
        ]);
        graph.insert_edge(edge("0xvictim", "0xhacker", "0xseed", dec!(1)));
        graph.insert_edge(edge("0xhacker", "0xleaf", "0xtx1", dec!(1)));

        prune_dead_ends(&mut graph, &["0xvictim".to_string(), "0xhacker".to_string()]);

        assert!(graph.node("0xleaf").is_none());
        // 0xhacker drops to out-degree 0 once 0xleaf is removed, but it's a
        // seed address, so the second pass must not remove it.
        assert!(graph.node("0xhacker").is_some());
        assert!(graph.node("0xvictim").is_some());
    }

    #[test]
    fn known_exchange_survives_dead_end_pruning() {
        let mut graph = graph_with_nodes(vec![node("0xcex", EntityKind::Cex, Some("Binance"), 0)]);
        prune_dead_ends(&mut graph, &[]);
        assert!(graph.node("0xcex").is_some());
    }

    #[test]
    fn consolidation_merges_group_onto_earliest_master() {
        let mut graph = graph_with_nodes(vec![
            node("0xa", EntityKind::Cex, Some("Binance"), 5),
            node("0xb", EntityKind::Cex, Some("Binance"), 2),
            node("0xc", EntityKind::Cex, Some("Binance"), 9),
            node("0xsrc", EntityKind::Unknown, None, 0),
        ]);
        graph.insert_edge(edge("0xsrc", "0xa", "0x1", dec!(1)));
        graph.insert_edge(edge("0xsrc", "0xb", "0x2", dec!(1)));
        graph.insert_edge(edge("0xsrc", "0xc", "0x3", dec!(1)));

        consolidate_entities(&mut graph);

        assert!(graph.node("0xa").is_none());
        assert!(graph.node("0xc").is_none());
        let master = graph.node("0xb").expect("lowest insertion order survives");
        assert_eq!(master.consolidated_addresses.len(), 2);
        assert_eq!(graph.out_degree("0xsrc"), 1);
    }

    #[test]
    fn flow_annotation_buckets_importance() {
        let mut graph = graph_with_nodes(vec![
            node("0xa", EntityKind::Unknown, None, 0),
            node("0xb", EntityKind::Unknown, None, 1),
        ]);
        graph.insert_edge(edge("0xa", "0xb", "0x1", dec!(15)));
        annotate_flows(&mut graph, dec!(100));
        let e = graph.edges().next().unwrap();
        assert_eq!(e.flow_percentage, Some(15.0));
        assert_eq!(e.importance, Some(FlowImportance::Critical));
    }
}
