//! The bounded best-first expansion engine (§4.4): the heart of the system.
//! Owns the working graph for one job and drives it to completion, budget
//! exhaustion, deadline, or cancellation.

mod graph;

pub use graph::WorkingGraph;

use crate::classifier::{AddressClassifier, AddressStats};
use crate::filter::FilterPipeline;
use crate::model::{Edge, EntityKind, FilterReason, Incident, TerminationReason};
use crate::settings::EngineSettings;
use crate::source::TransactionSource;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// How the main loop stopped. `Completed` and `BudgetExhausted` are both
/// ordinary outcomes; `Deadline` and `Cancelled` are reported up to the job
/// controller so it can label the job accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExitCause {
    Completed,
    BudgetExhausted,
    Deadline,
    Cancelled,
}

/// Sink for mid-run progress updates; the job controller's implementation
/// forwards these to the repository. Kept as a trait so the engine never
/// depends on a concrete persistence layer (§9).
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, progress: u8, current_step: &str);
}

/// A reporter that does nothing, for tests and one-shot callers that only
/// care about the final [`ExpansionResult`].
pub struct NullProgressReporter;

#[async_trait]
impl ProgressReporter for NullProgressReporter {
    async fn report(&self, _progress: u8, _current_step: &str) {}
}

pub struct ExpansionResult {
    pub graph: WorkingGraph,
    pub exit_cause: LoopExitCause,
    pub api_calls_used: u32,
    pub nodes_processed: u32,
    pub edges_created: u32,
}

/// One node currently awaiting expansion.
type FrontierEntry = (String, u32);

pub struct ExpansionEngine {
    source: Arc<dyn TransactionSource>,
    classifier: Arc<AddressClassifier>,
    filter: FilterPipeline,
    settings: EngineSettings,
}

impl ExpansionEngine {
    pub fn new(
        source: Arc<dyn TransactionSource>,
        classifier: Arc<AddressClassifier>,
        filter: FilterPipeline,
        settings: EngineSettings,
    ) -> Self {
        Self {
            source,
            classifier,
            filter,
            settings,
        }
    }

    /// Build the initial graph: victim and hacker seeds plus the seed edge,
    /// and enqueue the hacker address for expansion (§4.4 Initialization).
    fn initialize(&self, incident: &Incident) -> (WorkingGraph, VecDeque<FrontierEntry>) {
        let mut graph = WorkingGraph::new();
        graph.ensure_node(&incident.victim_address, 0);
        graph.ensure_node(&incident.hacker_address, 1);

        if let Some(node) = graph.node_mut(&incident.victim_address) {
            node.entity_kind = EntityKind::Victim;
            node.confidence = 100.0;
            node.first_seen_block = incident.hack_block_number;
        }
        if let Some(node) = graph.node_mut(&incident.hacker_address) {
            node.entity_kind = EntityKind::Hacker;
            node.confidence = 95.0;
            node.first_seen_block = incident.hack_block_number;
        }

        graph.insert_edge(Edge {
            from: incident.victim_address.clone(),
            to: incident.hacker_address.clone(),
            tx_hash: incident.hack_tx_hash.clone(),
            value: incident.stolen_amount,
            block_number: incident.hack_block_number,
            timestamp: None,
            gas_used: None,
            gas_price: None,
            priority_score: 100,
            filter_reason: FilterReason::InitialHackTransaction,
            flow_percentage: None,
            importance: None,
        });

        let mut frontier = VecDeque::new();
        frontier.push_back((incident.hacker_address.clone(), 1));
        (graph, frontier)
    }

    /// Runs the main loop (§4.4) to completion. `deadline` is absolute;
    /// callers derive it from `settings.wall_deadline` at job-start time so
    /// a suspended/rescheduled task doesn't get extra budget.
    pub async fn run(
        &self,
        incident: &Incident,
        deadline: Instant,
        cancellation: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> ExpansionResult {
        let (mut graph, mut frontier) = self.initialize(incident);

        let mut processed: HashSet<String> = HashSet::new();
        let mut visit_count: HashMap<String, u32> = HashMap::new();
        let mut api_calls_used: u32 = 0;
        let mut nodes_processed: u32 = 0;
        let mut edges_created: u32 = 0;

        let exit_cause = loop {
            if frontier.is_empty() {
                break LoopExitCause::Completed;
            }
            if api_calls_used >= self.settings.max_api_calls
                || graph.node_count() as u32 >= self.settings.max_nodes
            {
                break LoopExitCause::BudgetExhausted;
            }
            if cancellation.is_cancelled() {
                break LoopExitCause::Cancelled;
            }
            if Instant::now() >= deadline {
                break LoopExitCause::Deadline;
            }

            let (address, depth) = frontier.pop_front().expect("checked non-empty above");
            if processed.contains(&address) || depth >= self.settings.max_depth {
                continue;
            }

            *visit_count.entry(address.clone()).or_insert(0) += 1;

            let start_block = graph
                .node(&address)
                .and_then(|n| n.first_seen_block)
                .unwrap_or(0);

            let fetch = tokio::select! {
                biased;
                _ = cancellation.cancelled() => None,
                result = self.source.fetch_outgoing(&address, start_block, 50, true) => Some(result),
            };
            api_calls_used += 1;

            let raw_transactions = match fetch {
                None => break LoopExitCause::Cancelled,
                Some(Ok(txs)) => txs,
                Some(Err(err)) => {
                    tracing::warn!(address = %address, error = %err, "transaction source failed, abandoning node");
                    if let Some(node) = graph.node_mut(&address) {
                        node.termination_reason = Some(TerminationReason::UpstreamUnavailable);
                    }
                    processed.insert(address.clone());
                    nodes_processed += 1;
                    self.emit_progress(progress, nodes_processed).await;
                    continue;
                }
            };

            let total_raw_count = raw_transactions.len() as u64;
            let filtered = self.filter.run(
                &raw_transactions,
                &address,
                incident.stolen_amount,
                &visit_count,
            );

            let mut cumulative_value = Decimal::ZERO;
            for tx in filtered
                .into_iter()
                .take(self.settings.max_transactions_per_node as usize)
            {
                let is_new = graph.ensure_node(&tx.to, depth + 1);
                if is_new {
                    if let Some(node) = graph.node_mut(&tx.to) {
                        node.first_seen_block = Some(tx.block_number);
                    }
                    if depth + 1 < self.settings.max_depth {
                        frontier.push_back((tx.to.clone(), depth + 1));
                    }
                }

                let inserted = graph.insert_edge(Edge {
                    from: tx.from.clone(),
                    to: tx.to.clone(),
                    tx_hash: tx.tx_hash.clone(),
                    value: tx.value,
                    block_number: Some(tx.block_number),
                    timestamp: tx.timestamp,
                    gas_used: tx.gas_used,
                    gas_price: tx.gas_price,
                    priority_score: tx.priority_score,
                    filter_reason: FilterReason::FilteredTransaction,
                    flow_percentage: None,
                    importance: None,
                });
                if inserted {
                    edges_created += 1;
                    cumulative_value += tx.value;
                    *visit_count.entry(tx.to.clone()).or_insert(0) += 1;
                }
            }

            let cumulative_value_pct = if incident.stolen_amount > Decimal::ZERO {
                (cumulative_value / incident.stolen_amount * dec!(100))
                    .to_f64()
                    .unwrap_or(0.0)
            } else {
                100.0
            };

            let stats = AddressStats {
                transaction_count: total_raw_count,
                daily_tx_count: 0,
                times_seen_in_graph: visit_count.get(&address).copied().unwrap_or(1),
            };
            let classification = self.classifier.classify(&address, stats);

            if let Some(node) = graph.node_mut(&address) {
                node.entity_kind = classification.kind;
                node.confidence = classification.confidence;
                node.transaction_count = total_raw_count;
                node.friendly_name = classification.details.clone();
            }

            let termination = self.classifier.should_terminate(
                classification.kind,
                classification.confidence,
                total_raw_count,
                cumulative_value_pct,
            );
            if let Some(reason) = termination {
                if let Some(node) = graph.node_mut(&address) {
                    node.termination_reason = Some(reason);
                    node.manual_exploration_ready = classification.confidence < 80.0;
                }
                frontier.retain(|(addr, _)| addr != &address);
            }

            processed.insert(address);
            nodes_processed += 1;
            self.emit_progress(progress, nodes_processed).await;
        };

        ExpansionResult {
            graph,
            exit_cause,
            api_calls_used,
            nodes_processed,
            edges_created,
        }
    }

    async fn emit_progress(&self, progress: &dyn ProgressReporter, nodes_processed: u32) {
        let percentage = ((nodes_processed as f64 / 20.0) * 100.0).min(95.0) as u8;
        progress.report(percentage, "recursive_traversal").await;
    }
}

/// Computes an absolute deadline from the configured wall budget. Exposed so
/// the job controller can derive the same instant it later compares against.
pub fn deadline_from_now(settings: &EngineSettings) -> Instant {
    Instant::now() + settings.wall_deadline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawTx;
    use crate::source::{HealthStatus, SourceError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns, for whichever address it's called with, `txs_per_node`
    /// transactions *from that address* to a fresh never-before-seen
    /// destination, so repeated calls keep expanding the frontier instead of
    /// immediately failing the outgoing-only filter (`filter.rs`'s
    /// `tx.from == node_address` check).
    struct StubSource {
        calls: AtomicUsize,
        txs_per_node: usize,
    }

    #[async_trait]
    impl TransactionSource for StubSource {
        async fn fetch_outgoing(
            &self,
            address: &str,
            _start_block: u64,
            _limit: u32,
            _ascending: bool,
        ) -> Result<Vec<RawTx>, SourceError> {
            let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
            let txs = (0..self.txs_per_node)
                .map(|i| RawTx {
                    tx_hash: format!("0xtx-{call_index}-{i}"),
                    from: address.to_string(),
                    to: format!("0xnode-{call_index}-{i}"),
                    value_base_units: "1000000000000000000".to_string(),
                    block_number: 1,
                    timestamp: None,
                    gas_used: None,
                    gas_price: None,
                })
                .collect();
            Ok(txs)
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Available
        }
    }

    fn incident() -> Incident {
        Incident {
            incident_id: "inc-1".to_string(),
            victim_address: "0xvictim".to_string(),
            hacker_address: "0xhacker".to_string(),
            hack_tx_hash: "0xseed".to_string(),
            stolen_amount: dec!(100),
            hack_block_number: Some(1),
        }
    }

    #[tokio::test]
    async fn seed_only_graph_completes_with_two_nodes_one_edge() {
        let source: Arc<dyn TransactionSource> = Arc::new(StubSource {
            calls: AtomicUsize::new(0),
            txs_per_node: 0,
        });
        let engine = ExpansionEngine::new(
            source,
            Arc::new(AddressClassifier::with_known_directory()),
            FilterPipeline::default(),
            EngineSettings::default(),
        );
        let cancellation = CancellationToken::new();
        let result = engine
            .run(
                &incident(),
                deadline_from_now(&EngineSettings::default()),
                &cancellation,
                &NullProgressReporter,
            )
            .await;

        assert_eq!(result.exit_cause, LoopExitCause::Completed);
        assert_eq!(result.graph.node_count(), 2);
        assert_eq!(result.graph.edge_count(), 1);
        assert_eq!(result.api_calls_used, 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_at_max_api_calls() {
        let source: Arc<dyn TransactionSource> = Arc::new(StubSource {
            calls: AtomicUsize::new(0),
            txs_per_node: 10,
        });
        let mut settings = EngineSettings::default();
        settings.max_api_calls = 3;
        settings.max_transactions_per_node = 5;

        let engine = ExpansionEngine::new(
            source,
            Arc::new(AddressClassifier::with_known_directory()),
            FilterPipeline::default(),
            settings.clone(),
        );
        let cancellation = CancellationToken::new();
        let result = engine
            .run(
                &incident(),
                deadline_from_now(&settings),
                &cancellation,
                &NullProgressReporter,
            )
            .await;

        assert_eq!(result.exit_cause, LoopExitCause::BudgetExhausted);
        assert_eq!(result.api_calls_used, 3);
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_iterations() {
        let source: Arc<dyn TransactionSource> = Arc::new(StubSource {
            calls: AtomicUsize::new(0),
            txs_per_node: 0,
        });
        let engine = ExpansionEngine::new(
            source,
            Arc::new(AddressClassifier::with_known_directory()),
            FilterPipeline::default(),
            EngineSettings::default(),
        );
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let result = engine
            .run(
                &incident(),
                deadline_from_now(&EngineSettings::default()),
                &cancellation,
                &NullProgressReporter,
            )
            .await;

        assert_eq!(result.exit_cause, LoopExitCause::Cancelled);
    }
}
