//! Address classification: a static directory of known entities plus a
//! handful of statistics-driven heuristics (§4.2).

use crate::model::{normalize_address, Address, EntityKind, TerminationReason};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct DirectoryEntry {
    kind: EntityKind,
    confidence: f64,
    name: &'static str,
}

/// Classification result for one address.
#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: EntityKind,
    pub confidence: f64,
    /// Friendly name or heuristic label, used both for display and as the
    /// post-processing consolidation key.
    pub details: Option<String>,
}

/// Statistics about an address the classifier uses to reach a verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressStats {
    pub transaction_count: u64,
    pub daily_tx_count: u64,
    pub times_seen_in_graph: u32,
}

/// Pure in-process logic over a static directory plus runtime statistics.
/// The directory is immutable after construction and safe to share across
/// concurrently running jobs.
pub struct AddressClassifier {
    directory: HashMap<Address, DirectoryEntry>,
}

impl Default for AddressClassifier {
    fn default() -> Self {
        Self::with_known_directory()
    }
}

impl AddressClassifier {
    pub fn with_known_directory() -> Self {
        let entries: &[(&str, EntityKind, f64, &'static str)] = &[
            // Centralized exchanges.
            (
                "0x3f5ce5fbfe3e9af3971dd833d26ba9b5c936f0be",
                EntityKind::Cex,
                95.0,
                "Binance",
            ),
            (
                "0xd551234ae421e3bcba99a0da6d736074f22192ff",
                EntityKind::Cex,
                95.0,
                "Binance",
            ),
            (
                "0x564286362092d8e7936f0549571a803b203aaced",
                EntityKind::Cex,
                95.0,
                "Binance",
            ),
            (
                "0x0681d8db095565fe8a346fa0277bffde9c0edbbf",
                EntityKind::Cex,
                95.0,
                "Binance",
            ),
            (
                "0x32be343b94f860124dc4fee278fdcbd38c102d88",
                EntityKind::Cex,
                95.0,
                "Poloniex",
            ),
            (
                "0xb794f5ea0ba39494ce839613fffba74279579268",
                EntityKind::Cex,
                95.0,
                "Poloniex",
            ),
            (
                "0x267be1c1d684f78cb4f6a176c4911b741e4ffdc0",
                EntityKind::Cex,
                95.0,
                "Kraken",
            ),
            (
                "0xfa52274dd61e1643d2205169732f29114bc240b3",
                EntityKind::Cex,
                95.0,
                "Kraken",
            ),
            (
                "0x1522900b6dafac587d499a862861c0869be6e428",
                EntityKind::Cex,
                95.0,
                "KuCoin",
            ),
            (
                "0x2b5634c42055806a59e9107ed44d43c426e58258",
                EntityKind::Cex,
                95.0,
                "KuCoin",
            ),
            // Decentralized exchange routers.
            (
                "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
                EntityKind::Dex,
                90.0,
                "Uniswap V2 Router",
            ),
            (
                "0xe592427a0aece92de3edee1f18e0157c05861564",
                EntityKind::Dex,
                90.0,
                "Uniswap V3 Router",
            ),
            (
                "0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45",
                EntityKind::Dex,
                90.0,
                "Uniswap Router",
            ),
            (
                "0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f",
                EntityKind::Dex,
                90.0,
                "SushiSwap Router",
            ),
            (
                "0x1111111254fb6c44bac0bed2854e76f90643097d",
                EntityKind::Dex,
                85.0,
                "1inch Router",
            ),
            // Mixers.
            (
                "0x8ba1f109551bd432803012645bac136c0cd747e",
                EntityKind::Mixer,
                85.0,
                "Tornado Cash",
            ),
            (
                "0x47ce0c6ed5b0ce3d3a51fdb1c52dc66a7c3c2936",
                EntityKind::Mixer,
                85.0,
                "Tornado Cash",
            ),
            // Bridges.
            (
                "0x3154cf16ccdb4c6d922629664174b904d80f2c35",
                EntityKind::Bridge,
                80.0,
                "Base Bridge",
            ),
            (
                "0xa0b86a33e6c68c93d8b48fc5b41bc1ee0ba9f41d",
                EntityKind::Bridge,
                80.0,
                "Polygon Bridge",
            ),
        ];

        let directory = entries
            .iter()
            .map(|(addr, kind, confidence, name)| {
                (
                    normalize_address(addr),
                    DirectoryEntry {
                        kind: *kind,
                        confidence: *confidence,
                        name,
                    },
                )
            })
            .collect();

        Self { directory }
    }

    /// Rules are applied in order; the first match wins (§4.2).
    pub fn classify(&self, address: &str, stats: AddressStats) -> Classification {
        let address = normalize_address(address);

        if let Some(entry) = self.directory.get(&address) {
            return Classification {
                kind: entry.kind,
                confidence: entry.confidence,
                details: Some(entry.name.to_string()),
            };
        }

        if stats.daily_tx_count > 100 {
            return Classification {
                kind: EntityKind::HighFrequencyService,
                confidence: 60.0,
                details: Some(format!("High frequency: {} tx/day", stats.daily_tx_count)),
            };
        }

        if stats.times_seen_in_graph >= 3 {
            return Classification {
                kind: EntityKind::ConsolidationPoint,
                confidence: 70.0,
                details: Some(format!("Seen {} times in graph", stats.times_seen_in_graph)),
            };
        }

        self.classify_by_heuristics(stats)
    }

    fn classify_by_heuristics(&self, stats: AddressStats) -> Classification {
        let tx_count = stats.transaction_count;
        let daily = stats.daily_tx_count;

        if tx_count > 10_000 {
            return if daily > 500 {
                Classification {
                    kind: EntityKind::Cex,
                    confidence: 40.0,
                    details: Some(format!("High volume: {tx_count} total, {daily}/day")),
                }
            } else {
                Classification {
                    kind: EntityKind::PotentialEndpoint,
                    confidence: 30.0,
                    details: Some(format!("High historical volume: {tx_count}")),
                }
            };
        }

        if tx_count > 1_000 {
            return Classification {
                kind: EntityKind::PotentialEndpoint,
                confidence: 25.0,
                details: Some(format!("Moderate volume: {tx_count}")),
            };
        }

        if tx_count < 100 && daily < 5 {
            return Classification {
                kind: EntityKind::PotentialEndpoint,
                confidence: 20.0,
                details: Some("Low activity wallet".to_string()),
            };
        }

        Classification {
            kind: EntityKind::Unknown,
            confidence: 0.0,
            details: None,
        }
    }

    /// Whether exploration should stop at this node, and why (§4.2).
    pub fn should_terminate(
        &self,
        kind: EntityKind,
        confidence: f64,
        outgoing_count: u64,
        cumulative_value_pct: f64,
    ) -> Option<TerminationReason> {
        if confidence > 70.0
            && matches!(kind, EntityKind::Cex | EntityKind::Dex | EntityKind::Mixer)
        {
            return Some(TerminationReason::HighConfidenceClassification);
        }
        if outgoing_count > 200 {
            return Some(TerminationReason::HighTransactionVolume);
        }
        if cumulative_value_pct < 5.0 {
            return Some(TerminationReason::InsufficientValueFlow);
        }
        if kind == EntityKind::HighFrequencyService {
            return Some(TerminationReason::HighFrequencyServiceDetected);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_hit_wins_regardless_of_statistics() {
        let classifier = AddressClassifier::with_known_directory();
        let stats = AddressStats {
            transaction_count: 0,
            daily_tx_count: 1000,
            times_seen_in_graph: 10,
        };
        let result = classifier.classify("0x3F5CE5FBFE3E9AF3971DD833D26BA9B5C936F0BE", stats);
        assert_eq!(result.kind, EntityKind::Cex);
        assert_eq!(result.confidence, 95.0);
        assert_eq!(result.details.as_deref(), Some("Binance"));
    }

    #[test]
    fn high_frequency_before_consolidation() {
        let classifier = AddressClassifier::with_known_directory();
        let stats = AddressStats {
            transaction_count: 0,
            daily_tx_count: 150,
            times_seen_in_graph: 5,
        };
        let result = classifier.classify("0xunknownaddress", stats);
        assert_eq!(result.kind, EntityKind::HighFrequencyService);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let classifier = AddressClassifier::with_known_directory();
        let stats = AddressStats {
            transaction_count: 500,
            daily_tx_count: 10,
            times_seen_in_graph: 1,
        };
        let result = classifier.classify("0xunknownaddress", stats);
        assert_eq!(result.kind, EntityKind::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn should_terminate_on_high_confidence_endpoint() {
        let classifier = AddressClassifier::with_known_directory();
        let reason = classifier.should_terminate(EntityKind::Cex, 95.0, 3, 50.0);
        assert_eq!(reason, Some(TerminationReason::HighConfidenceClassification));
    }

    #[test]
    fn should_not_terminate_unknown_low_activity() {
        let classifier = AddressClassifier::with_known_directory();
        let reason = classifier.should_terminate(EntityKind::Unknown, 0.0, 1, 50.0);
        assert_eq!(reason, None);
    }
}
