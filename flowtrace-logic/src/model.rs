//! Shared data types for the incident flow graph: addresses, nodes, edges,
//! and the raw/normalized transaction shapes that pass between the
//! transaction source, the filter pipeline, and the expansion engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lowercase hexadecimal account identifier. Treated as an opaque key
/// everywhere outside of normalization.
pub type Address = String;

pub fn normalize_address(address: &str) -> Address {
    address.trim().to_ascii_lowercase()
}

/// The recorded theft this graph is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: String,
    pub victim_address: Address,
    pub hacker_address: Address,
    pub hack_tx_hash: String,
    /// Native-currency value of the seed transaction; the denominator for
    /// flow percentages and size-scaled filter thresholds.
    pub stolen_amount: Decimal,
    pub hack_block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Victim,
    Hacker,
    Cex,
    Dex,
    Mixer,
    Bridge,
    HighFrequencyService,
    ConsolidationPoint,
    PotentialEndpoint,
    Unknown,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Victim => "Victim",
            EntityKind::Hacker => "Hacker",
            EntityKind::Cex => "CEX",
            EntityKind::Dex => "DEX",
            EntityKind::Mixer => "Mixer",
            EntityKind::Bridge => "Bridge",
            EntityKind::HighFrequencyService => "HighFrequencyService",
            EntityKind::ConsolidationPoint => "ConsolidationPoint",
            EntityKind::PotentialEndpoint => "PotentialEndpoint",
            EntityKind::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    HighConfidenceClassification,
    HighTransactionVolume,
    InsufficientValueFlow,
    HighFrequencyServiceDetected,
    UpstreamUnavailable,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::HighConfidenceClassification => "high_confidence_classification",
            TerminationReason::HighTransactionVolume => "high_transaction_volume",
            TerminationReason::InsufficientValueFlow => "insufficient_value_flow",
            TerminationReason::HighFrequencyServiceDetected => "high_frequency_service_detected",
            TerminationReason::UpstreamUnavailable => "upstream_unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    InitialHackTransaction,
    FilteredTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowImportance {
    Critical,
    Significant,
    Minor,
}

/// A node observed in the working graph: one address, plus everything the
/// engine and classifier have learned about it so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub address: Address,
    pub depth_from_hack: u32,
    pub entity_kind: EntityKind,
    pub confidence: f64,
    pub transaction_count: u64,
    pub termination_reason: Option<TerminationReason>,
    pub manual_exploration_ready: bool,
    pub consolidated_into: Option<Address>,
    /// Addresses merged into this node during consolidation (master nodes only).
    pub consolidated_addresses: Vec<Address>,
    /// Friendly name reported by the classifier, used to group consolidation
    /// candidates. `None` for addresses the classifier could not name.
    pub friendly_name: Option<String>,
    /// First block this address was observed at, used as the pagination
    /// cursor for subsequent transaction-source calls.
    pub first_seen_block: Option<u64>,
    /// Monotonically increasing order in which the node was first created;
    /// breaks ties when choosing a consolidation master.
    pub insertion_order: u64,
}

impl Node {
    pub fn new(address: Address, depth: u32, insertion_order: u64) -> Self {
        Self {
            address,
            depth_from_hack: depth,
            entity_kind: EntityKind::Unknown,
            confidence: 0.0,
            transaction_count: 0,
            termination_reason: None,
            manual_exploration_ready: false,
            consolidated_into: None,
            consolidated_addresses: Vec::new(),
            friendly_name: None,
            first_seen_block: None,
            insertion_order,
        }
    }

    pub fn out_degree_capped(&self) -> bool {
        self.termination_reason.is_some()
    }
}

/// One observed outgoing transaction selected into the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: Address,
    pub to: Address,
    pub tx_hash: String,
    pub value: Decimal,
    pub block_number: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<u64>,
    pub priority_score: u32,
    pub filter_reason: FilterReason,
    pub flow_percentage: Option<f64>,
    pub importance: Option<FlowImportance>,
}

/// A transaction as returned by the transaction source, before filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTx {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    /// Value in base units (wei-equivalent), as a decimal string so we never
    /// lose precision moving it across a JSON boundary.
    pub value_base_units: String,
    pub block_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<u64>,
}

/// A `RawTx` after address lowercasing and base-unit-to-native conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTx {
    pub tx_hash: String,
    pub from: Address,
    pub to: Address,
    pub value: Decimal,
    pub block_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<u64>,
    pub priority_score: u32,
}

/// One entry of the top-path report produced by post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopPathEntry {
    pub rank: usize,
    pub value: Decimal,
    pub flow_percentage: f64,
    pub hop_count: u32,
    pub final_endpoint_kind: EntityKind,
    pub final_endpoint_confidence: f64,
}
