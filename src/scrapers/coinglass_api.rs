//! CoinGlass futures API client
//!
//! Every call goes through a single fixed-interval throttle. There are no
//! automatic retries: a failed call surfaces as a [`RequestError`] and the
//! batch loop above decides what to do with it.

use crate::config::ApiConfig;
use crate::models::{DepthPoint, ExchangePairTable};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error};

pub const SUPPORTED_COINS: &str = "/api/futures/supported-coins";
pub const SUPPORTED_EXCHANGE_PAIRS: &str = "/api/futures/supported-exchange-pairs";
pub const PAIRS_MARKETS: &str = "/api/futures/pairs-markets";
pub const ASK_BIDS_HISTORY: &str = "/api/futures/orderbook/ask-bids-history";

const API_KEY_HEADER: &str = "cg-api-key";

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Non-2xx HTTP status
    #[error("API request failed for {endpoint}: {status} - {body}")]
    Transport {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// 2xx status but the payload's `code` is not "0"
    #[error("API error for {endpoint} (code {code}): {message}")]
    Application {
        endpoint: String,
        code: String,
        message: String,
    },

    /// Transport failure: no status, or the body could not be read
    #[error("request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },

    #[error("unexpected payload from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl RequestError {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Application { endpoint, .. }
            | Self::Network { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP GET the client sits on
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, query: &[(String, String)]) -> anyhow::Result<RawResponse>;
}

/// reqwest-backed transport carrying the API key header
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(api_key: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("perps-indexer/0.1")
            .default_headers({
                let mut headers = HeaderMap::new();
                headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
                headers.insert(
                    HeaderName::from_static(API_KEY_HEADER),
                    api_key.parse().context("Invalid CoinGlass api key")?,
                );
                headers
            })
            .build()
            .context("Failed to build CoinGlass HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> anyhow::Result<RawResponse> {
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.context("failed to read response body")?;
        Ok(RawResponse { status, body })
    }
}

/// Fixed-interval throttle. Holds the instant the last request completed.
struct RateLimiter {
    last_request: Option<Instant>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: None,
            min_interval,
        }
    }

    async fn acquire(&self) {
        let Some(last) = self.last_request else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            let wait_time = self.min_interval - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time.as_millis());
            sleep(wait_time).await;
        }
    }

    fn mark(&mut self) {
        self.last_request = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub requests_per_minute: u32,
    pub delay_between_requests: Duration,
    pub estimated_secs_per_item: f64,
    pub request_count: u64,
}

pub struct CoinGlassClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    requests_per_minute: u32,
    rate_limiter: RateLimiter,
    request_count: u64,
}

impl CoinGlassClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.key)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &ApiConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            requests_per_minute: config.rate_limit.requests_per_minute,
            rate_limiter: RateLimiter::new(config.rate_limit.delay()),
            request_count: 0,
        }
    }

    /// Throttled GET returning the whole JSON payload.
    ///
    /// `None` params are left out of the query string.
    pub async fn request(
        &mut self,
        endpoint: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<Value, RequestError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}{}", self.base_url, endpoint);
        let query: Vec<(String, String)> = params
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
            .collect();

        let outcome = self.transport.get(&url, &query).await;
        self.rate_limiter.mark();
        self.request_count += 1;

        let result = outcome
            .map_err(|e| RequestError::Network {
                endpoint: endpoint.to_string(),
                message: format!("{e:#}"),
            })
            .and_then(|raw| check_response(endpoint, raw));

        if let Err(e) = &result {
            error!(endpoint, "API request failed: {}", e);
        }
        result
    }

    pub async fn supported_coins(&mut self) -> Result<Vec<String>, RequestError> {
        let payload = self.request(SUPPORTED_COINS, &[]).await?;
        decode_data(SUPPORTED_COINS, &payload)
    }

    /// Raw payload `data` plus its typed reading
    pub async fn supported_exchange_pairs(
        &mut self,
    ) -> Result<(Value, ExchangePairTable), RequestError> {
        let payload = self.request(SUPPORTED_EXCHANGE_PAIRS, &[]).await?;
        let table = decode_data(SUPPORTED_EXCHANGE_PAIRS, &payload)?;
        let raw = payload.get("data").cloned().unwrap_or(Value::Null);
        Ok((raw, table))
    }

    pub async fn pairs_markets(&mut self, symbol: &str) -> Result<Value, RequestError> {
        self.request(PAIRS_MARKETS, &[("symbol", Some(symbol.to_string()))])
            .await
    }

    pub async fn depth_history(
        &mut self,
        exchange: &str,
        symbol: &str,
        interval: &str,
        range: u32,
    ) -> Result<Vec<DepthPoint>, RequestError> {
        let params = [
            ("exchange", Some(exchange.to_string())),
            ("symbol", Some(symbol.to_string())),
            ("interval", Some(interval.to_string())),
            ("range", Some(range.to_string())),
        ];
        let payload = self.request(ASK_BIDS_HISTORY, &params).await?;
        decode_data(ASK_BIDS_HISTORY, &payload)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn rate_limit_info(&self) -> RateLimitInfo {
        let delay = self.rate_limiter.min_interval;
        RateLimitInfo {
            requests_per_minute: self.requests_per_minute,
            delay_between_requests: delay,
            estimated_secs_per_item: delay.as_secs_f64(),
            request_count: self.request_count,
        }
    }
}

fn check_response(endpoint: &str, raw: RawResponse) -> Result<Value, RequestError> {
    if !raw.is_success() {
        return Err(RequestError::Transport {
            endpoint: endpoint.to_string(),
            status: raw.status,
            body: raw.body,
        });
    }

    let payload: Value = serde_json::from_str(&raw.body).map_err(|e| RequestError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })?;

    // Upstream sends the code as a string, but tolerate a bare number
    let code = match payload.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
        None => "missing".to_string(),
    };
    if code != "0" {
        let message = payload
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(RequestError::Application {
            endpoint: endpoint.to_string(),
            code,
            message,
        });
    }

    Ok(payload)
}

fn decode_data<T: DeserializeOwned>(endpoint: &str, payload: &Value) -> Result<T, RequestError> {
    let data = payload.get("data").cloned().unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|e| RequestError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays canned responses and records when and how it was called
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<anyhow::Result<RawResponse>>>,
        calls: Mutex<Vec<(Instant, String, Vec<(String, String)>)>>,
    }

    impl ScriptedTransport {
        fn push_ok(&self, body: &str) {
            self.responses.lock().push_back(Ok(RawResponse {
                status: 200,
                body: body.to_string(),
            }));
        }

        fn push_status(&self, status: u16, body: &str) {
            self.responses.lock().push_back(Ok(RawResponse {
                status,
                body: body.to_string(),
            }));
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str, query: &[(String, String)]) -> anyhow::Result<RawResponse> {
            self.calls
                .lock()
                .push((Instant::now(), url.to_string(), query.to_vec()));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("connection refused")))
        }
    }

    fn client(transport: Arc<ScriptedTransport>, delay_ms: u64) -> CoinGlassClient {
        let mut config = ApiConfig::default();
        config.base_url = "https://api.test".to_string();
        config.rate_limit.delay_between_requests_ms = delay_ms;
        CoinGlassClient::with_transport(&config, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_requests_are_spaced() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        let mut api = client(transport.clone(), 2000);

        api.request(SUPPORTED_COINS, &[]).await.unwrap();
        api.request(SUPPORTED_COINS, &[]).await.unwrap();

        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 2);
        let gap = calls[1].0 - calls[0].0;
        assert!(gap >= Duration::from_millis(2000), "gap was {:?}", gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_not_delayed() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        let mut api = client(transport.clone(), 2000);

        let start = Instant::now();
        api.request(SUPPORTED_COINS, &[]).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_holds_after_failure() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_status(500, "boom");
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        let mut api = client(transport.clone(), 1500);

        assert!(api.request(SUPPORTED_COINS, &[]).await.is_err());
        api.request(SUPPORTED_COINS, &[]).await.unwrap();

        let calls = transport.calls.lock();
        assert!(calls[1].0 - calls[0].0 >= Duration::from_millis(1500));
        assert_eq!(api.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_when_interval_already_elapsed() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        let mut api = client(transport.clone(), 1000);

        api.request(SUPPORTED_COINS, &[]).await.unwrap();
        sleep(Duration::from_millis(3000)).await;
        let before = Instant::now();
        api.request(SUPPORTED_COINS, &[]).await.unwrap();
        assert!(before.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_transport_error_carries_status_and_body() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_status(401, "invalid key");
        let mut api = client(transport, 0);

        let err = api.request(PAIRS_MARKETS, &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.endpoint(), PAIRS_MARKETS);
        match err {
            RequestError::Transport { body, .. } => assert_eq!(body, "invalid key"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_application_error_from_payload_code() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(r#"{"code":"40001","msg":"Upgrade plan"}"#);
        let mut api = client(transport, 0);

        let err = api.request(SUPPORTED_COINS, &[]).await.unwrap_err();
        match err {
            RequestError::Application { code, message, .. } => {
                assert_eq!(code, "40001");
                assert_eq!(message, "Upgrade plan");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_numeric_zero_code_is_success_and_missing_code_is_not() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(r#"{"code":0,"data":["BTC"]}"#);
        transport.push_ok(r#"{"data":["BTC"]}"#);
        let mut api = client(transport, 0);

        assert_eq!(api.supported_coins().await.unwrap(), vec!["BTC"]);
        assert!(matches!(
            api.supported_coins().await,
            Err(RequestError::Application { .. })
        ));
    }

    #[tokio::test]
    async fn test_network_failure_is_typed() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut api = client(transport, 0);

        let err = api.request(SUPPORTED_COINS, &[]).await.unwrap_err();
        assert!(matches!(err, RequestError::Network { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_query_drops_absent_params() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        let mut api = client(transport.clone(), 0);

        api.request(
            PAIRS_MARKETS,
            &[("symbol", Some("BTC".to_string())), ("limit", None)],
        )
        .await
        .unwrap();

        let calls = transport.calls.lock();
        assert_eq!(calls[0].1, "https://api.test/api/futures/pairs-markets");
        assert_eq!(calls[0].2, vec![("symbol".to_string(), "BTC".to_string())]);
    }

    #[tokio::test]
    async fn test_depth_history_params_and_decode() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(
            r#"{"code":"0","data":[{"time":100,"bids_usd":1.5},{"time":200,"bids_usd":2.5}]}"#,
        );
        let mut api = client(transport.clone(), 0);

        let points = api
            .depth_history("Binance", "ETHUSDT", "1d", 2)
            .await
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].time, 200);

        let calls = transport.calls.lock();
        let query = &calls[0].2;
        assert!(query.contains(&("exchange".to_string(), "Binance".to_string())));
        assert!(query.contains(&("range".to_string(), "2".to_string())));
    }

    #[tokio::test]
    async fn test_truncated_body_is_network_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{\"code\"")
                .await
                .unwrap();
        });

        let mut config = ApiConfig::default();
        config.base_url = format!("http://{addr}");
        config.rate_limit.delay_between_requests_ms = 0;
        let transport = HttpTransport::new("cg-test-key-0123456789").unwrap();
        let mut api = CoinGlassClient::with_transport(&config, Arc::new(transport));

        let err = api.request(SUPPORTED_COINS, &[]).await.unwrap_err();
        server.await.unwrap();
        match err {
            RequestError::Network { message, .. } => {
                assert!(message.contains("response body"), "{message}")
            }
            other => panic!("expected a network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_info() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(r#"{"code":"0","data":[]}"#);
        let mut api = client(transport, 0);
        api.request(SUPPORTED_COINS, &[]).await.unwrap();

        let info = api.rate_limit_info();
        assert_eq!(info.requests_per_minute, 30);
        assert_eq!(info.request_count, 1);
    }
}
