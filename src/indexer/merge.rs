//! Time-keyed merge of depth history into a stored series

use crate::models::{DepthPoint, DepthRecord, Pair, PairInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Stamps raw points with the pair identity and the fetch time
pub fn annotate(
    points: Vec<DepthPoint>,
    pair: &Pair,
    exchange: &str,
    fetched_at: DateTime<Utc>,
) -> Vec<DepthRecord> {
    let pair_info = PairInfo::new(pair, exchange);
    points
        .into_iter()
        .map(|p| DepthRecord {
            time: p.time,
            fields: p.fields,
            pair_info: pair_info.clone(),
            fetched_at,
        })
        .collect()
}

/// Merges `incoming` into `existing` by `time`.
///
/// A record whose time is already present replaces it at the same index;
/// new times are appended in incoming order. If `incoming` repeats a time,
/// the last one wins.
pub fn merge(existing: Vec<DepthRecord>, incoming: Vec<DepthRecord>) -> Vec<DepthRecord> {
    let mut merged = existing;
    // First occurrence wins if the stored file already repeats a time
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(merged.len());
    for (i, r) in merged.iter().enumerate() {
        index.entry(r.time).or_insert(i);
    }

    for record in incoming {
        match index.get(&record.time) {
            Some(&i) => merged[i] = record,
            None => {
                index.insert(record.time, merged.len());
                merged.push(record);
            }
        }
    }
    merged
}
