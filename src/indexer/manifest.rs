//! Run outcome accounting
//!
//! [`RunManifest`] tracks the depth backfill (per exchange counters and a
//! failure log that persist across runs). [`DailyRunManifest`] tracks one
//! day's ticker run.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// Success/failure counters for one exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeCounts {
    pub success: u64,
    pub failed: u64,
}

/// Per-exchange counters in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeTally {
    entries: Vec<(String, ExchangeCounts)>,
}

impl ExchangeTally {
    pub fn get(&self, exchange: &str) -> Option<&ExchangeCounts> {
        self.entries
            .iter()
            .find(|(name, _)| name == exchange)
            .map(|(_, counts)| counts)
    }

    fn counts_mut(&mut self, exchange: &str) -> &mut ExchangeCounts {
        let pos = match self.entries.iter().position(|(name, _)| name == exchange) {
            Some(pos) => pos,
            None => {
                self.entries
                    .push((exchange.to_string(), ExchangeCounts::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos].1
    }
}

impl Index<&str> for ExchangeTally {
    type Output = ExchangeCounts;

    fn index(&self, exchange: &str) -> &ExchangeCounts {
        match self.get(exchange) {
            Some(counts) => counts,
            None => panic!("no counters for exchange {exchange}"),
        }
    }
}

impl Serialize for ExchangeTally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (exchange, counts) in &self.entries {
            map.serialize_entry(exchange, counts)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeTally {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TallyVisitor;

        impl<'de> Visitor<'de> for TallyVisitor {
            type Value = ExchangeTally;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping exchange names to counters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut tally = ExchangeTally::default();
                while let Some((exchange, counts)) =
                    access.next_entry::<String, ExchangeCounts>()?
                {
                    *tally.counts_mut(&exchange) = counts;
                }
                Ok(tally)
            }
        }

        deserializer.deserialize_map(TallyVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPair {
    pub instrument_id: String,
    pub exchange: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted shape of `futures/depth/_manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthManifest {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub total_pairs: u64,
    #[serde(default)]
    pub processed_pairs: u64,
    #[serde(default)]
    pub failed_pairs: Vec<FailedPair>,
    #[serde(default)]
    pub exchanges: ExchangeTally,
}

impl DepthManifest {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            last_updated: now,
            total_pairs: 0,
            processed_pairs: 0,
            failed_pairs: Vec::new(),
            exchanges: ExchangeTally::default(),
        }
    }
}

/// Mutable manifest for one depth run.
///
/// Counters only grow and failures are only appended. `processedPairs`
/// counts outcomes of this run alone.
pub struct RunManifest {
    state: DepthManifest,
    clock: Arc<dyn Clock>,
    processed: u64,
}

impl RunManifest {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: DepthManifest::empty(clock.now()),
            clock,
            processed: 0,
        }
    }

    /// Continue from a previously saved manifest
    pub fn resume(previous: DepthManifest, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: previous,
            clock,
            processed: 0,
        }
    }

    pub fn set_total_pairs(&mut self, total: u64) {
        self.state.total_pairs = total;
    }

    pub fn record_success(&mut self, exchange: &str) {
        self.counts(exchange).success += 1;
        self.processed += 1;
    }

    pub fn record_failure(&mut self, exchange: &str, instrument_id: &str, error: &str) {
        self.counts(exchange).failed += 1;
        self.state.failed_pairs.push(FailedPair {
            instrument_id: instrument_id.to_string(),
            exchange: exchange.to_string(),
            error: error.to_string(),
            timestamp: self.clock.now(),
        });
        self.processed += 1;
    }

    /// Outcomes recorded since construction
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Current state without stamping
    pub fn snapshot(&self) -> &DepthManifest {
        &self.state
    }

    pub fn finalize(&mut self) -> DepthManifest {
        self.state.processed_pairs = self.processed;
        self.state.last_updated = self.clock.now();
        self.state.clone()
    }

    fn counts(&mut self, exchange: &str) -> &mut ExchangeCounts {
        self.state.exchanges.counts_mut(exchange)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinFailure {
    pub coin: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted shape of `futures/<date>/_manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyManifest {
    pub run_started_at_utc: DateTime<Utc>,
    pub run_finished_at_utc: Option<DateTime<Utc>>,
    pub coins_total: u64,
    pub coins_succeeded: u64,
    pub coins_failed: u64,
    pub failures: Vec<CoinFailure>,
}

pub struct DailyRunManifest {
    state: DailyManifest,
    clock: Arc<dyn Clock>,
}

impl DailyRunManifest {
    pub fn start(coins_total: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: DailyManifest {
                run_started_at_utc: clock.now(),
                run_finished_at_utc: None,
                coins_total,
                coins_succeeded: 0,
                coins_failed: 0,
                failures: Vec::new(),
            },
            clock,
        }
    }

    pub fn record_success(&mut self) {
        self.state.coins_succeeded += 1;
    }

    pub fn record_failure(&mut self, coin: &str, error: &str) {
        self.state.coins_failed += 1;
        self.state.failures.push(CoinFailure {
            coin: coin.to_string(),
            error: error.to_string(),
            timestamp: self.clock.now(),
        });
    }

    pub fn snapshot(&self) -> &DailyManifest {
        &self.state
    }

    pub fn finalize(&mut self) -> DailyManifest {
        self.state.run_finished_at_utc = Some(self.clock.now());
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{Duration, TimeZone};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_three_successes_one_failure() {
        let clock = clock();
        let mut run = RunManifest::new(clock.clone());
        run.record_success("Binance");
        run.record_success("Binance");
        run.record_failure("Binance", "FOOUSDT", "API error (code 40001): bad symbol");
        run.record_success("Binance");

        clock.advance(Duration::minutes(5));
        let m = run.finalize();

        assert_eq!(m.exchanges["Binance"], ExchangeCounts { success: 3, failed: 1 });
        assert_eq!(m.failed_pairs.len(), 1);
        assert_eq!(m.failed_pairs[0].instrument_id, "FOOUSDT");
        assert_eq!(m.failed_pairs[0].error, "API error (code 40001): bad symbol");
        assert_eq!(m.processed_pairs, 4);
        assert_eq!(m.last_updated, Utc.with_ymd_and_hms(2024, 5, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn test_resume_accumulates_counters() {
        let clock = clock();
        let mut first = RunManifest::new(clock.clone());
        first.record_success("Bybit");
        first.record_failure("Bybit", "XUSDT", "boom");
        let saved = first.finalize();

        let mut second = RunManifest::resume(saved, clock);
        second.record_success("Bybit");
        let m = second.finalize();

        assert_eq!(m.exchanges["Bybit"], ExchangeCounts { success: 2, failed: 1 });
        assert_eq!(m.failed_pairs.len(), 1);
        assert_eq!(m.processed_pairs, 1);
    }

    #[test]
    fn test_depth_manifest_json_shape() {
        let mut run = RunManifest::new(clock());
        run.set_total_pairs(7);
        run.record_failure("OKX", "ABC-USDT-SWAP", "no data");
        let value = serde_json::to_value(run.finalize()).unwrap();

        assert_eq!(value["totalPairs"], 7);
        assert_eq!(value["processedPairs"], 1);
        assert_eq!(value["lastUpdated"], "2024-05-01T00:00:00Z");
        assert_eq!(value["exchanges"]["OKX"]["failed"], 1);
        assert_eq!(value["failedPairs"][0]["instrument_id"], "ABC-USDT-SWAP");
    }

    #[test]
    fn test_exchanges_keep_first_seen_order() {
        let mut run = RunManifest::new(clock());
        run.record_success("OKX");
        run.record_success("Kraken");
        run.record_failure("Binance", "FOOUSDT", "boom");
        run.record_success("OKX");

        let text = serde_json::to_string(&run.finalize()).unwrap();
        let okx = text.find("\"OKX\":").unwrap();
        let kraken = text.find("\"Kraken\":").unwrap();
        let binance = text.find("\"Binance\":").unwrap();
        assert!(okx < kraken && kraken < binance, "{text}");

        let back: DepthManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(back.exchanges["OKX"], ExchangeCounts { success: 2, failed: 0 });
        assert_eq!(serde_json::to_string(&back).unwrap(), text);
    }

    #[test]
    fn test_daily_manifest() {
        let clock = clock();
        let mut run = DailyRunManifest::start(3, clock.clone());
        run.record_success();
        run.record_failure("DOGE", "timeout");
        run.record_success();
        assert!(run.snapshot().run_finished_at_utc.is_none());

        clock.advance(Duration::seconds(90));
        let m = run.finalize();
        assert_eq!(m.coins_total, 3);
        assert_eq!(m.coins_succeeded, 2);
        assert_eq!(m.coins_failed, 1);
        assert_eq!(m.failures[0].coin, "DOGE");
        assert_eq!(
            m.run_finished_at_utc,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 1, 30).unwrap())
        );
    }
}
