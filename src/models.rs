use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// A futures trading pair as listed by one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub instrument_id: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Upstream fields we don't interpret, written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pair {
    pub fn new(instrument_id: &str, base_asset: &str, quote_asset: &str) -> Self {
        Self {
            instrument_id: instrument_id.to_string(),
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            extra: Map::new(),
        }
    }
}

/// Exchange name -> pairs, in the order upstream returned them.
///
/// Serialized as a JSON object; key order survives a read/write cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangePairTable {
    entries: Vec<(String, Vec<Pair>)>,
}

impl ExchangePairTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to an existing exchange or adds it at the end.
    pub fn push(&mut self, exchange: &str, pair: Pair) {
        match self.entries.iter_mut().find(|(name, _)| name == exchange) {
            Some((_, pairs)) => pairs.push(pair),
            None => self.entries.push((exchange.to_string(), vec![pair])),
        }
    }

    /// Replaces the pairs of `exchange`, keeping its position if present.
    pub fn insert(&mut self, exchange: &str, pairs: Vec<Pair>) {
        match self.entries.iter_mut().find(|(name, _)| name == exchange) {
            Some((_, existing)) => *existing = pairs,
            None => self.entries.push((exchange.to_string(), pairs)),
        }
    }

    pub fn get(&self, exchange: &str) -> Option<&[Pair]> {
        self.entries
            .iter()
            .find(|(name, _)| name == exchange)
            .map(|(_, pairs)| pairs.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Pair])> {
        self.entries
            .iter()
            .map(|(name, pairs)| (name.as_str(), pairs.as_slice()))
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn exchange_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_pairs(&self) -> usize {
        self.entries.iter().map(|(_, pairs)| pairs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<Pair>)> for ExchangePairTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Pair>)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (exchange, pairs) in iter {
            table.insert(&exchange, pairs);
        }
        table
    }
}

impl Serialize for ExchangePairTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (exchange, pairs) in &self.entries {
            map.serialize_entry(exchange, pairs)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExchangePairTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ExchangePairTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping exchange names to pair lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = ExchangePairTable::new();
                while let Some((exchange, pairs)) = access.next_entry::<String, Vec<Pair>>()? {
                    table.insert(&exchange, pairs);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Identity stamped onto every stored depth record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairInfo {
    pub instrument_id: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub exchange: String,
}

impl PairInfo {
    pub fn new(pair: &Pair, exchange: &str) -> Self {
        Self {
            instrument_id: pair.instrument_id.clone(),
            base_asset: pair.base_asset.clone(),
            quote_asset: pair.quote_asset.clone(),
            exchange: exchange.to_string(),
        }
    }
}

/// One raw entry from the order-book ask/bid history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthPoint {
    /// Unix milliseconds
    pub time: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A depth point as persisted in `<instrument>_<exchange>.json`.
/// `time` is unique within one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthRecord {
    pub time: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub pair_info: PairInfo,
    pub fetched_at: DateTime<Utc>,
}

/// Combined per-day ticker dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedDump<M> {
    pub date: String,
    pub total_pairs: usize,
    pub data: Vec<Value>,
    pub manifest: M,
}
