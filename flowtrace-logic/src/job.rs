//! The async Job Controller (§4.6): one job per incident, a start-rate
//! floor, cooperative cancellation, and persistence of whatever the engine
//! produced regardless of how the job ended.

use crate::classifier::AddressClassifier;
use crate::engine::{deadline_from_now, ExpansionEngine, ExpansionResult, LoopExitCause, ProgressReporter};
use crate::error::FlowTraceError;
use crate::filter::FilterPipeline;
use crate::model::{EntityKind, Incident};
use crate::postprocess::PostProcessor;
use crate::repository::{GraphStatus, GraphTotals, PartialResults, Repository};
use crate::settings::{EngineSettings, JobControllerSettings};
use crate::source::TransactionSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct JobAccepted {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
}

struct RunningJob {
    cancellation: CancellationToken,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
    created_at: Instant,
}

/// Orchestrates one engine run per incident. Holds the collaborators the
/// engine needs (`source`, `classifier`, `repository`) so `start` can spawn
/// a self-contained supervisory task per accepted job.
pub struct JobController {
    repository: Arc<dyn Repository>,
    source: Arc<dyn TransactionSource>,
    classifier: Arc<AddressClassifier>,
    engine_settings: EngineSettings,
    controller_settings: JobControllerSettings,
    active: Mutex<HashMap<String, RunningJob>>,
    last_job_start: Mutex<Option<Instant>>,
}

impl JobController {
    pub fn new(
        repository: Arc<dyn Repository>,
        source: Arc<dyn TransactionSource>,
        classifier: Arc<AddressClassifier>,
        engine_settings: EngineSettings,
        controller_settings: JobControllerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            repository,
            source,
            classifier,
            engine_settings,
            controller_settings,
            active: Mutex::new(HashMap::new()),
            last_job_start: Mutex::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>, incident_id: &str) -> Result<JobAccepted, FlowTraceError> {
        {
            let active = self.active.lock().await;
            if active.contains_key(incident_id) {
                return Err(FlowTraceError::AlreadyProcessing(incident_id.to_string()));
            }
        }

        self.enforce_rate_floor().await;

        let incident = self
            .repository
            .get_incident(incident_id)
            .await
            .map_err(|e| FlowTraceError::Internal(e.to_string()))?
            .ok_or_else(|| FlowTraceError::IncidentNotFound(incident_id.to_string()))?;

        let seed_transactions = self
            .repository
            .get_incident_seed_transactions(incident_id)
            .await
            .map_err(|e| FlowTraceError::Internal(e.to_string()))?;
        if !seed_transactions
            .iter()
            .any(|tx| tx.tx_hash == incident.hack_tx_hash)
        {
            return Err(FlowTraceError::Internal(format!(
                "incident {incident_id} has no recorded seed transaction for hack_tx_hash {}",
                incident.hack_tx_hash
            )));
        }

        self.repository
            .create_graph_record(incident_id)
            .await
            .map_err(|e| FlowTraceError::Internal(e.to_string()))?;

        let cancellation = CancellationToken::new();
        let created_at = Utc::now();
        let estimated_completion =
            created_at + chrono::Duration::from_std(self.engine_settings.wall_deadline).unwrap_or_default();

        let controller = self.clone();
        let job_cancellation = cancellation.clone();
        let job_incident_id = incident_id.to_string();
        let handle = tokio::spawn(async move {
            controller.run_job(job_incident_id, incident, job_cancellation).await;
        });

        self.active.lock().await.insert(
            incident_id.to_string(),
            RunningJob {
                cancellation,
                handle,
                created_at: Instant::now(),
            },
        );
        *self.last_job_start.lock().await = Some(Instant::now());

        Ok(JobAccepted {
            job_id: incident_id.to_string(),
            created_at,
            estimated_completion,
        })
    }

    /// Cooperative stop: flips the job's cancellation token. The engine
    /// notices at the top of its next iteration or its next await point.
    pub async fn cancel(&self, incident_id: &str) -> bool {
        if let Some(job) = self.active.lock().await.get(incident_id) {
            job.cancellation.cancel();
            true
        } else {
            false
        }
    }

    async fn enforce_rate_floor(&self) {
        let mut last_start = self.last_job_start.lock().await;
        if let Some(last) = *last_start {
            let elapsed = last.elapsed();
            if elapsed < self.controller_settings.min_job_interval {
                tokio::time::sleep(self.controller_settings.min_job_interval - elapsed).await;
            }
        }
        *last_start = Some(Instant::now());
    }

    async fn run_job(self: Arc<Self>, incident_id: String, incident: Incident, cancellation: CancellationToken) {
        let reporter = RepositoryProgressReporter {
            repository: self.repository.clone(),
            incident_id: incident_id.clone(),
        };
        let engine = ExpansionEngine::new(
            self.source.clone(),
            self.classifier.clone(),
            FilterPipeline::new(self.engine_settings.min_transaction_value),
            self.engine_settings.clone(),
        );
        let deadline = deadline_from_now(&self.engine_settings);
        let started_at = Instant::now();

        let outcome = tokio::time::timeout(
            self.engine_settings.wall_deadline,
            engine.run(&incident, deadline, &cancellation, &reporter),
        )
        .await;

        match outcome {
            Ok(result) => self.persist_outcome(&incident_id, &incident, result, started_at).await,
            Err(_elapsed) => {
                let _ = self
                    .repository
                    .update_graph_status(
                        &incident_id,
                        GraphStatus::Timeout,
                        None,
                        None,
                        Some("processing timed out"),
                        Some(FlowTraceError::ProcessingTimeout(self.engine_settings.wall_deadline).code()),
                        None,
                    )
                    .await;
            }
        }

        self.active.lock().await.remove(&incident_id);
    }

    async fn persist_outcome(
        &self,
        incident_id: &str,
        incident: &Incident,
        mut result: ExpansionResult,
        started_at: Instant,
    ) {
        match result.exit_cause {
            LoopExitCause::Cancelled => {
                let partial = graph_partial_results(&result);
                let _ = self
                    .repository
                    .update_graph_status(
                        incident_id,
                        GraphStatus::Cancelled,
                        None,
                        None,
                        Some("job cancelled"),
                        Some(FlowTraceError::JobCancelled.code()),
                        Some(partial),
                    )
                    .await;
                return;
            }
            LoopExitCause::Deadline => {
                let partial = graph_partial_results(&result);
                let _ = self
                    .repository
                    .update_graph_status(
                        incident_id,
                        GraphStatus::Timeout,
                        None,
                        None,
                        Some("wall-clock deadline reached"),
                        Some(FlowTraceError::ProcessingTimeout(self.engine_settings.wall_deadline).code()),
                        Some(partial),
                    )
                    .await;
                return;
            }
            LoopExitCause::Completed | LoopExitCause::BudgetExhausted => {}
        }

        let seed_addresses = [incident.victim_address.clone(), incident.hacker_address.clone()];
        let top_paths = PostProcessor::run(&mut result.graph, incident.stolen_amount, &seed_addresses);

        let mut endpoint_summary: HashMap<EntityKind, u32> = HashMap::new();
        let mut max_depth = 0u32;
        let mut total_value_traced = rust_decimal::Decimal::ZERO;

        for node in result.graph.nodes() {
            *endpoint_summary.entry(node.entity_kind).or_insert(0) += 1;
            max_depth = max_depth.max(node.depth_from_hack);
            let _ = self.repository.upsert_node(incident_id, node.clone()).await;
        }
        for edge in result.graph.edges() {
            total_value_traced += edge.value;
            let _ = self.repository.insert_edge(incident_id, edge.clone()).await;
        }

        let totals = GraphTotals {
            total_nodes: result.graph.node_count() as u32,
            total_edges: result.graph.edge_count() as u32,
            max_depth,
            total_value_traced,
            processing_time_seconds: started_at.elapsed().as_secs(),
            api_calls_used: result.api_calls_used,
        };

        let _ = self
            .repository
            .finalize_graph(incident_id, totals, endpoint_summary, top_paths)
            .await;
    }
}

fn graph_partial_results(result: &ExpansionResult) -> PartialResults {
    let max_depth = result
        .graph
        .nodes()
        .map(|n| n.depth_from_hack)
        .max()
        .unwrap_or(0);
    PartialResults {
        total_nodes: result.graph.node_count() as u32,
        total_edges: result.graph.edge_count() as u32,
        max_depth,
    }
}

struct RepositoryProgressReporter {
    repository: Arc<dyn Repository>,
    incident_id: String,
}

#[async_trait]
impl ProgressReporter for RepositoryProgressReporter {
    async fn report(&self, progress: u8, current_step: &str) {
        let _ = self
            .repository
            .update_graph_status(
                &self.incident_id,
                GraphStatus::Running,
                Some(progress),
                Some(current_step),
                None,
                None,
                None,
            )
            .await;
    }
}
