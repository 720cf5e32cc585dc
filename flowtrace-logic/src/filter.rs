//! The three-tier transaction filter pipeline (§4.3): normalize, apply hard
//! primary filters, score and promote in the secondary tier, then stable-sort
//! by priority in the tertiary tier. Deterministic: identical inputs yield
//! identical outputs.

use crate::model::{normalize_address, NormalizedTx, RawTx};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Minimum native-currency value a transaction must clear to survive the
/// primary tier, regardless of the incident's stolen amount.
pub const DEFAULT_MIN_VALUE: Decimal = dec!(0.05);

/// Gas price above which a transaction earns the "above average" bonus.
const GAS_PRICE_BONUS_THRESHOLD_WEI: u64 = 20_000_000_000;

const WEI_PER_NATIVE_UNIT: Decimal = dec!(1_000_000_000_000_000_000);

pub struct FilterPipeline {
    pub min_value: Decimal,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self {
            min_value: DEFAULT_MIN_VALUE,
        }
    }
}

impl FilterPipeline {
    pub fn new(min_value: Decimal) -> Self {
        Self { min_value }
    }

    /// Run all three tiers and return the transactions ranked by priority,
    /// highest first. The caller is responsible for the top-K truncation
    /// (the engine does this, §4.4).
    pub fn run(
        &self,
        raw_transactions: &[RawTx],
        node_address: &str,
        stolen_amount: Decimal,
        visit_count: &HashMap<String, u32>,
    ) -> Vec<NormalizedTx> {
        let node_address = normalize_address(node_address);

        let normalized: Vec<NormalizedTx> = raw_transactions
            .iter()
            .filter_map(|raw| normalize(raw))
            .collect();

        let primary: Vec<NormalizedTx> = normalized
            .into_iter()
            .filter(|tx| tx.from == node_address)
            .filter(|tx| tx.value >= self.min_value)
            .filter(|tx| passes_size_scaled_threshold(tx.value, stolen_amount))
            .collect();

        let mut secondary: Vec<NormalizedTx> = primary
            .into_iter()
            .map(|mut tx| {
                tx.priority_score = score(&tx, visit_count);
                tx
            })
            .collect();

        // Stable sort: ties keep their original (block/response) order.
        secondary.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
        secondary
    }
}

fn normalize(raw: &RawTx) -> Option<NormalizedTx> {
    let base_units: Decimal = raw.value_base_units.parse().ok()?;
    let value = base_units / WEI_PER_NATIVE_UNIT;

    Some(NormalizedTx {
        tx_hash: raw.tx_hash.clone(),
        from: normalize_address(&raw.from),
        to: normalize_address(&raw.to),
        value,
        block_number: raw.block_number,
        timestamp: raw.timestamp,
        gas_used: raw.gas_used,
        gas_price: raw.gas_price,
        priority_score: 0,
    })
}

fn passes_size_scaled_threshold(value: Decimal, stolen_amount: Decimal) -> bool {
    if stolen_amount <= Decimal::ZERO {
        return true;
    }
    let percentage = (value / stolen_amount) * dec!(100);
    let minimum = min_percentage_threshold(stolen_amount);
    percentage >= minimum
}

fn min_percentage_threshold(stolen_amount: Decimal) -> Decimal {
    if stolen_amount > dec!(100) {
        dec!(0.1)
    } else if stolen_amount >= dec!(10) {
        dec!(0.5)
    } else {
        dec!(1.0)
    }
}

fn score(tx: &NormalizedTx, visit_count: &HashMap<String, u32>) -> u32 {
    let mut score = if tx.value > dec!(10) {
        50
    } else if tx.value > dec!(1) {
        30
    } else if tx.value > dec!(0.1) {
        20
    } else {
        10
    };

    if is_round_amount(tx.value) {
        score += 10;
    }

    if tx.gas_price.map(|g| g > GAS_PRICE_BONUS_THRESHOLD_WEI).unwrap_or(false) {
        score += 15;
    }

    if visit_count.get(&tx.to).copied().unwrap_or(0) >= 3 {
        score += 20;
    }

    score.min(100)
}

fn is_round_amount(value: Decimal) -> bool {
    value.fract().is_zero() || (value * dec!(1000)).fract().is_zero()
}
