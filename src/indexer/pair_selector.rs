//! Cross-exchange pair selection
//!
//! Picks the pairs whose base asset is *not* listed on a reference exchange
//! but is listed on at least `min_exchange_count` candidate exchanges.

use crate::models::{ExchangePairTable, Pair};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

pub const DEFAULT_MIN_EXCHANGE_COUNT: usize = 4;

/// Candidate pairs whose base asset is absent from `reference`.
///
/// Candidates missing from `table` are skipped; a candidate named twice is
/// taken once. Output follows candidate order.
pub fn exclusion_table(
    table: &ExchangePairTable,
    reference: &str,
    candidates: &[String],
) -> ExchangePairTable {
    let reference_assets: HashSet<&str> = table
        .get(reference)
        .unwrap_or_default()
        .iter()
        .map(|p| p.base_asset.as_str())
        .collect();

    debug!(
        reference,
        base_assets = reference_assets.len(),
        "Reference exchange base assets"
    );

    let mut out = ExchangePairTable::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for exchange in candidates {
        if !seen.insert(exchange.as_str()) {
            continue;
        }
        let Some(pairs) = table.get(exchange) else {
            debug!(exchange = exchange.as_str(), "Candidate exchange not in table, skipping");
            continue;
        };
        let kept: Vec<Pair> = pairs
            .iter()
            .filter(|p| !reference_assets.contains(p.base_asset.as_str()))
            .cloned()
            .collect();
        out.insert(exchange, kept);
    }
    out
}

/// Number of distinct exchanges each base asset appears under
pub fn base_asset_exchange_counts(table: &ExchangePairTable) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, pairs) in table.iter() {
        let assets: HashSet<&str> = pairs.iter().map(|p| p.base_asset.as_str()).collect();
        for asset in assets {
            *counts.entry(asset).or_default() += 1;
        }
    }
    counts
}

/// Keeps pairs whose base asset spans at least `min_exchange_count`
/// exchanges. Exchanges left empty are dropped.
pub fn apply_exchange_threshold(
    table: &ExchangePairTable,
    min_exchange_count: usize,
) -> ExchangePairTable {
    let counts = base_asset_exchange_counts(table);

    let mut out = ExchangePairTable::new();
    for (exchange, pairs) in table.iter() {
        let kept: Vec<Pair> = pairs
            .iter()
            .filter(|p| counts.get(p.base_asset.as_str()).copied().unwrap_or(0) >= min_exchange_count)
            .cloned()
            .collect();
        if kept.is_empty() {
            if !pairs.is_empty() {
                warn!(
                    exchange,
                    dropped = pairs.len(),
                    min_exchange_count,
                    "All pairs dropped by cross-exchange threshold"
                );
            }
            continue;
        }
        out.insert(exchange, kept);
    }

    let dropped_assets = counts
        .values()
        .filter(|&&c| c < min_exchange_count)
        .count();
    if dropped_assets > 0 {
        info!(
            dropped_assets,
            min_exchange_count, "Base assets below cross-exchange threshold"
        );
    }
    out
}

/// Full selection: exclusion against `reference`, then the threshold
pub fn select_pairs(
    table: &ExchangePairTable,
    reference: &str,
    candidates: &[String],
    min_exchange_count: usize,
) -> ExchangePairTable {
    let excluded = exclusion_table(table, reference, candidates);
    apply_exchange_threshold(&excluded, min_exchange_count)
}

/// Truncates each exchange to its first `max` pairs
pub fn cap_pairs_per_exchange(table: &ExchangePairTable, max: usize) -> ExchangePairTable {
    table
        .iter()
        .map(|(exchange, pairs)| (exchange.to_string(), pairs.iter().take(max).cloned().collect()))
        .collect()
}
