//! Engine configuration (§6). Mirrors the teacher's `IndexerSettings`
//! shape: a `serde`-deserializable struct with `#[serde(default = ...)]`
//! per-field defaults, so a deployment config only needs to override what
//! it wants to change.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_with::serde_as;
use std::time;

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    pub max_depth: u32,
    pub max_api_calls: u32,
    pub max_transactions_per_node: u32,
    pub max_nodes: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub wall_deadline: time::Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub cache_ttl: time::Duration,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub min_transaction_value: Decimal,
    /// Reserved: time-bucketed prioritization is not wired into the filter
    /// pipeline yet (§9 open question); these are carried through config so
    /// a future tier can pick them up without a breaking change.
    pub high_priority_hours: u32,
    pub medium_priority_hours: u32,
    pub low_priority_days: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_api_calls: 25,
            max_transactions_per_node: 5,
            max_nodes: 500,
            wall_deadline: time::Duration::from_secs(30),
            cache_ttl: time::Duration::from_secs(600),
            min_transaction_value: dec!(0.05),
            high_priority_hours: 6,
            medium_priority_hours: 72,
            low_priority_days: 30,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct JobControllerSettings {
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub min_job_interval: time::Duration,
}

impl Default for JobControllerSettings {
    fn default() -> Self {
        Self {
            min_job_interval: time::Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = EngineSettings::default();
        assert_eq!(s.max_api_calls, 25);
        assert_eq!(s.max_nodes, 500);
        assert_eq!(s.max_depth, 8);
        assert_eq!(s.max_transactions_per_node, 5);
        assert_eq!(s.wall_deadline, time::Duration::from_secs(30));
    }
}
