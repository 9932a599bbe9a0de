//! CoinGlass API connectivity check
//!
//! Calls supported-coins, supported-exchange-pairs and pairs-markets once
//! each and reports what came back. Exits non-zero on the first failure.
//!
//! Usage:
//!   check_api [--symbol BTC] [--api-key KEY]

use anyhow::{bail, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info, warn};

use perps_indexer::{
    cli::{init_tracing, load_env, CommonArgs},
    scrapers::{CoinGlassClient, RequestError},
};

#[derive(Parser, Debug)]
#[command(name = "check_api")]
#[command(about = "Check CoinGlass API connectivity and key")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Symbol used for the pairs-markets check
    #[arg(long, default_value = "BTC")]
    symbol: String,
}

#[tokio::main]
async fn main() {
    load_env();
    let args = Args::parse();
    init_tracing(&args.common.log_level);

    if let Err(e) = run(args).await {
        error!("❌ API test failed: {:#}", e);
        if let Some(req) = e.downcast_ref::<RequestError>() {
            match req.status() {
                Some(401) | Some(403) => {
                    warn!("💡 This looks like an authentication error. Please check your API key.")
                }
                Some(429) => warn!("💡 Rate limit exceeded. Try a lower --rate-limit."),
                _ => {}
            }
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.common.resolve()?;
    if config.api.key.trim().is_empty() {
        bail!(
            "No API key found. Set COINGLASS_API_KEY or create a .env file with COINGLASS_API_KEY=your_key_here"
        );
    }

    info!("🧪 Testing CoinGlass API connection...");
    info!("🔑 Key preview: {}", config.api.masked_key());
    info!("🌐 Base URL: {}", config.api.base_url);

    let mut client = CoinGlassClient::new(&config.api)?;

    info!("📡 Testing supported coins endpoint...");
    let coins = client.supported_coins().await?;
    let sample: Vec<&str> = coins.iter().take(5).map(String::as_str).collect();
    info!("✅ Supported coins: {} coins", coins.len());
    info!("   Sample: {}...", sample.join(", "));

    info!("📡 Testing supported pairs endpoint...");
    let (_, table) = client.supported_exchange_pairs().await?;
    info!(
        "✅ Supported pairs: {} exchanges, {} pairs",
        table.exchange_count(),
        table.total_pairs()
    );

    info!("📡 Testing pairs markets endpoint ({})...", args.symbol);
    let payload = client.pairs_markets(&args.symbol).await?;
    let markets = payload
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    info!("✅ {} markets: {} pairs", args.symbol, markets.len());
    if let Some(sample) = markets.first() {
        info!(
            "   Sample data: {} - {} - ${}",
            field(sample, "exchange_name"),
            field(sample, "symbol"),
            field(sample, "current_price")
        );
    }

    let rate = client.rate_limit_info();
    info!("🎉 All API tests passed successfully!");
    info!(
        "📊 Rate limit: {} req/min, {}ms delay, {} requests made",
        rate.requests_per_minute,
        rate.delay_between_requests.as_millis(),
        rate.request_count
    );
    Ok(())
}

fn field(entry: &Value, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "?".to_string(),
    }
}
