//! The persistent-store boundary (§6): an opaque repository interface plus
//! an in-memory implementation used by tests and by the thin server binary
//! until a real store is wired in. No concrete database code belongs here
//! or in the engine (§9).

use crate::model::{Edge, EntityKind, Incident, Node, TopPathEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    Pending,
    Running,
    Completed,
    Timeout,
    Error,
    Cancelled,
}

impl GraphStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphStatus::Pending => "pending",
            GraphStatus::Running => "running",
            GraphStatus::Completed => "completed",
            GraphStatus::Timeout => "timeout",
            GraphStatus::Error => "error",
            GraphStatus::Cancelled => "cancelled",
        }
    }
}

/// Attached to `error`/`timeout` records whenever the graph has at least
/// one node beyond the seeds (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialResults {
    pub total_nodes: u32,
    pub total_edges: u32,
    pub max_depth: u32,
}

#[derive(Debug, Clone)]
pub struct GraphTotals {
    pub total_nodes: u32,
    pub total_edges: u32,
    pub max_depth: u32,
    pub total_value_traced: rust_decimal::Decimal,
    pub processing_time_seconds: u64,
    pub api_calls_used: u32,
}

#[derive(Debug, Clone)]
pub struct GraphStatusRecord {
    pub status: GraphStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub partial_results: Option<PartialResults>,
    pub totals: Option<GraphTotals>,
    pub endpoint_summary: Option<HashMap<EntityKind, u32>>,
    pub top_paths: Option<Vec<TopPathEntry>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Opaque persistence contract. Implementors own their own transaction and
/// conflict semantics; the engine and job controller see only this trait.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_incident(&self, incident_id: &str) -> anyhow::Result<Option<Incident>>;

    /// The raw seed transaction(s) backing the incident record, fetched
    /// separately so a caller can detect a dangling incident with no
    /// recorded hack transaction.
    async fn get_incident_seed_transactions(
        &self,
        incident_id: &str,
    ) -> anyhow::Result<Vec<crate::model::RawTx>>;

    async fn create_graph_record(&self, incident_id: &str) -> anyhow::Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn update_graph_status(
        &self,
        incident_id: &str,
        status: GraphStatus,
        progress: Option<u8>,
        current_step: Option<&str>,
        error_message: Option<&str>,
        error_code: Option<&str>,
        partial_results: Option<PartialResults>,
    ) -> anyhow::Result<()>;

    async fn finalize_graph(
        &self,
        incident_id: &str,
        totals: GraphTotals,
        endpoint_summary: HashMap<EntityKind, u32>,
        top_paths: Vec<TopPathEntry>,
    ) -> anyhow::Result<()>;

    /// Keyed on (incident_id, address); a second call with the same key
    /// overwrites the stored node in full.
    async fn upsert_node(&self, incident_id: &str, node: Node) -> anyhow::Result<()>;

    /// Keyed on (incident_id, from, to, tx_hash); a second call with the
    /// same key is a no-op.
    async fn insert_edge(&self, incident_id: &str, edge: Edge) -> anyhow::Result<()>;

    async fn get_graph_status(&self, incident_id: &str) -> anyhow::Result<Option<GraphStatusRecord>>;
}

#[derive(Default)]
struct IncidentGraphState {
    nodes: HashMap<String, Node>,
    edges: HashMap<(String, String, String), Edge>,
    status: Option<GraphStatusRecord>,
}

/// A process-local repository: sufficient for tests and for a single-process
/// deployment without a real database behind it.
pub struct InMemoryRepository {
    incidents: Mutex<HashMap<String, Incident>>,
    seed_transactions: Mutex<HashMap<String, Vec<crate::model::RawTx>>>,
    graphs: Mutex<HashMap<String, IncidentGraphState>>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self {
            incidents: Mutex::new(HashMap::new()),
            seed_transactions: Mutex::new(HashMap::new()),
            graphs: Mutex::new(HashMap::new()),
        }
    }
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed_incident(&self, incident: Incident, seed_transactions: Vec<crate::model::RawTx>) {
        let incident_id = incident.incident_id.clone();
        self.incidents.lock().await.insert(incident_id.clone(), incident);
        self.seed_transactions
            .lock()
            .await
            .insert(incident_id, seed_transactions);
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_incident(&self, incident_id: &str) -> anyhow::Result<Option<Incident>> {
        Ok(self.incidents.lock().await.get(incident_id).cloned())
    }

    async fn get_incident_seed_transactions(
        &self,
        incident_id: &str,
    ) -> anyhow::Result<Vec<crate::model::RawTx>> {
        Ok(self
            .seed_transactions
            .lock()
            .await
            .get(incident_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_graph_record(&self, incident_id: &str) -> anyhow::Result<()> {
        let now = Utc::now();
        self.graphs.lock().await.insert(
            incident_id.to_string(),
            IncidentGraphState {
                nodes: HashMap::new(),
                edges: HashMap::new(),
                status: Some(GraphStatusRecord {
                    status: GraphStatus::Pending,
                    progress: 0,
                    current_step: None,
                    error_code: None,
                    error_message: None,
                    partial_results: None,
                    totals: None,
                    endpoint_summary: None,
                    top_paths: None,
                    created_at: now,
                    updated_at: now,
                }),
            },
        );
        Ok(())
    }

    async fn update_graph_status(
        &self,
        incident_id: &str,
        status: GraphStatus,
        progress: Option<u8>,
        current_step: Option<&str>,
        error_message: Option<&str>,
        error_code: Option<&str>,
        partial_results: Option<PartialResults>,
    ) -> anyhow::Result<()> {
        let mut graphs = self.graphs.lock().await;
        let state = graphs
            .entry(incident_id.to_string())
            .or_insert_with(IncidentGraphState::default);
        let now = Utc::now();
        let created_at = state
            .status
            .as_ref()
            .map(|s| s.created_at)
            .unwrap_or(now);
        let previous = state.status.take();
        state.status = Some(GraphStatusRecord {
            status,
            progress: progress.unwrap_or_else(|| previous.as_ref().map(|p| p.progress).unwrap_or(0)),
            current_step: current_step
                .map(|s| s.to_string())
                .or_else(|| previous.as_ref().and_then(|p| p.current_step.clone())),
            error_message: error_message.map(|s| s.to_string()),
            error_code: error_code.map(|s| s.to_string()),
            partial_results,
            totals: previous.as_ref().and_then(|p| p.totals.clone()),
            endpoint_summary: previous.as_ref().and_then(|p| p.endpoint_summary.clone()),
            top_paths: previous.as_ref().and_then(|p| p.top_paths.clone()),
            created_at,
            updated_at: now,
        });
        Ok(())
    }

    async fn finalize_graph(
        &self,
        incident_id: &str,
        totals: GraphTotals,
        endpoint_summary: HashMap<EntityKind, u32>,
        top_paths: Vec<TopPathEntry>,
    ) -> anyhow::Result<()> {
        let mut graphs = self.graphs.lock().await;
        let state = graphs
            .entry(incident_id.to_string())
            .or_insert_with(IncidentGraphState::default);
        let now = Utc::now();
        let created_at = state.status.as_ref().map(|s| s.created_at).unwrap_or(now);
        state.status = Some(GraphStatusRecord {
            status: GraphStatus::Completed,
            progress: 100,
            current_step: Some("finalized".to_string()),
            error_code: None,
            error_message: None,
            partial_results: None,
            totals: Some(totals),
            endpoint_summary: Some(endpoint_summary),
            top_paths: Some(top_paths),
            created_at,
            updated_at: now,
        });
        Ok(())
    }

    async fn upsert_node(&self, incident_id: &str, node: Node) -> anyhow::Result<()> {
        let mut graphs = self.graphs.lock().await;
        let state = graphs
            .entry(incident_id.to_string())
            .or_insert_with(IncidentGraphState::default);
        state.nodes.insert(node.address.clone(), node);
        Ok(())
    }

    async fn insert_edge(&self, incident_id: &str, edge: Edge) -> anyhow::Result<()> {
        let mut graphs = self.graphs.lock().await;
        let state = graphs
            .entry(incident_id.to_string())
            .or_insert_with(IncidentGraphState::default);
        let key = (edge.from.clone(), edge.to.clone(), edge.tx_hash.clone());
        state.edges.entry(key).or_insert(edge);
        Ok(())
    }

    async fn get_graph_status(&self, incident_id: &str) -> anyhow::Result<Option<GraphStatusRecord>> {
        Ok(self
            .graphs
            .lock()
            .await
            .get(incident_id)
            .and_then(|s| s.status.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn create_then_read_status_round_trips() {
        let repo = InMemoryRepository::new();
        repo.create_graph_record("inc-1").await.unwrap();
        let status = repo.get_graph_status("inc-1").await.unwrap().unwrap();
        assert_eq!(status.status, GraphStatus::Pending);
        assert_eq!(status.progress, 0);
    }

    #[tokio::test]
    async fn insert_edge_is_conflict_skip() {
        let repo = InMemoryRepository::new();
        repo.create_graph_record("inc-1").await.unwrap();
        let edge = Edge {
            from: "0xa".to_string(),
            to: "0xb".to_string(),
            tx_hash: "0x1".to_string(),
            value: dec!(1),
            block_number: None,
            timestamp: None,
            gas_used: None,
            gas_price: None,
            priority_score: 10,
            filter_reason: crate::model::FilterReason::FilteredTransaction,
            flow_percentage: None,
            importance: None,
        };
        repo.insert_edge("inc-1", edge.clone()).await.unwrap();
        repo.insert_edge("inc-1", edge).await.unwrap();
        assert_eq!(repo.graphs.lock().await.get("inc-1").unwrap().edges.len(), 1);
    }
}
