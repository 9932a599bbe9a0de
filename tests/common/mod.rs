#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use perps_indexer::clock::FixedClock;
use perps_indexer::config::IndexerConfig;
use perps_indexer::scrapers::{CoinGlassClient, RawResponse, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const BASE_URL: &str = "http://coinglass.test";

/// Answers by endpoint path plus the `exchange`/`symbol` query values.
/// Each route replays its queue; the last response repeats.
#[derive(Default)]
pub struct FakeApi {
    routes: Mutex<HashMap<String, VecDeque<RawResponse>>>,
    calls: Mutex<Vec<String>>,
}

fn route_key(path: &str, exchange: Option<&str>, symbol: Option<&str>) -> String {
    format!("{}|{}|{}", path, exchange.unwrap_or(""), symbol.unwrap_or(""))
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, path: &str, exchange: Option<&str>, symbol: Option<&str>, resp: RawResponse) {
        self.routes
            .lock()
            .entry(route_key(path, exchange, symbol))
            .or_default()
            .push_back(resp);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeApi {
    async fn get(&self, url: &str, query: &[(String, String)]) -> anyhow::Result<RawResponse> {
        let path = url.strip_prefix(BASE_URL).unwrap_or(url);
        let find = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        let key = route_key(path, find("exchange"), find("symbol"));
        self.calls.lock().push(key.clone());

        let mut routes = self.routes.lock();
        let resp = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(resp.unwrap_or_else(|| http(404, "no route")))
    }
}

pub fn ok(data: Value) -> RawResponse {
    RawResponse {
        status: 200,
        body: json!({"code": "0", "msg": "success", "data": data}).to_string(),
    }
}

pub fn app_error(code: &str, msg: &str) -> RawResponse {
    RawResponse {
        status: 200,
        body: json!({"code": code, "msg": msg}).to_string(),
    }
}

pub fn http(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        body: body.to_string(),
    }
}

pub fn test_config() -> IndexerConfig {
    let mut config = IndexerConfig::default();
    config.api.base_url = BASE_URL.to_string();
    config.api.key = "cg-test-key-0123456789".to_string();
    config.api.rate_limit.delay_between_requests_ms = 0;
    config.data.base_dir = "data".into();
    config.data.utils_dir = "utils".into();
    config.show_progress = false;
    config
}

pub fn client(config: &IndexerConfig, api: &Arc<FakeApi>) -> CoinGlassClient {
    CoinGlassClient::with_transport(&config.api, api.clone())
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ))
}

pub fn pair(instrument_id: &str, base: &str, quote: &str) -> Value {
    json!({"instrument_id": instrument_id, "base_asset": base, "quote_asset": quote})
}
