//! perps-indexer - CoinGlass futures data indexer
//!
//! Usage:
//!   perps-indexer daily [--profile github]
//!   perps-indexer depth [--exchanges Binance,Bybit --max-pairs-per-exchange 3]
//!
//! Environment Variables:
//!   COINGLASS_API_KEY - API key (required)
//!   RATE_LIMIT_REQUESTS_PER_MINUTE / RATE_LIMIT_DELAY_MS - throttle overrides
//!   PERPS_INDEXER_CONFIG - Path to TOML config file
//!   RUST_LOG - tracing filter (default: perps_indexer=info)

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use perps_indexer::{
    cli::{init_tracing, load_env, CommonArgs},
    clock::SystemClock,
    config::IndexerConfig,
    indexer::{DailyIndexer, DepthIndexer},
    scrapers::CoinGlassClient,
    store::FsStore,
    vcs::GitCli,
};

#[derive(Parser, Debug)]
#[command(name = "perps-indexer")]
#[command(version, about = "Cryptocurrency futures data indexer using the CoinGlass API")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh reference lists and snapshot today's pairs-markets data
    Daily,

    /// Backfill order-book depth for pairs not listed on the reference exchange
    Depth(DepthArgs),
}

#[derive(clap::Args, Debug)]
struct DepthArgs {
    /// Candidate exchanges to scan (comma separated)
    #[arg(long, value_delimiter = ',')]
    exchanges: Option<Vec<String>>,

    /// Keep only the first N pairs per exchange before the threshold
    #[arg(long)]
    max_pairs_per_exchange: Option<usize>,

    /// Minimum number of candidate exchanges listing a base asset
    #[arg(long)]
    min_exchange_count: Option<usize>,
}

impl DepthArgs {
    fn apply(&self, config: &mut IndexerConfig) {
        if let Some(exchanges) = &self.exchanges {
            config.depth.candidate_exchanges = exchanges
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Some(max) = self.max_pairs_per_exchange {
            config.depth.max_pairs_per_exchange = Some(max);
        }
        if let Some(min) = self.min_exchange_count {
            config.depth.min_exchange_count = min;
        }
    }
}

#[tokio::main]
async fn main() {
    load_env();
    let cli = Cli::parse();
    init_tracing(&cli.common.log_level);

    if let Err(e) = run(cli).await {
        error!("❌ Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = cli.common.resolve()?;
    if let Command::Depth(args) = &cli.command {
        args.apply(&mut config);
    }
    config.validate()?;

    info!("🔧 Profile: {:?}", cli.common.profile);
    info!("🔑 API key: {}", config.api.masked_key());
    info!(
        "⏱️ Rate limit: {} req/min, {}ms between requests",
        config.api.rate_limit.requests_per_minute, config.api.rate_limit.delay_between_requests_ms
    );
    info!("📁 Data directory: {}", config.data.base_dir.display());
    info!(
        "📤 Git commits: {}",
        if config.git.enabled { "enabled" } else { "disabled" }
    );

    let client = CoinGlassClient::new(&config.api)?;
    let store = Arc::new(FsStore);
    let clock = Arc::new(SystemClock);

    match cli.command {
        Command::Daily => {
            let vcs = Arc::new(GitCli::new(config.git.clone()));
            let mut indexer = DailyIndexer::new(&config, client, store, vcs, clock);
            let summary = indexer.run().await?;
            info!(
                "📊 {}: {}/{} coins, {} market entries",
                summary.date,
                summary.manifest.coins_succeeded,
                summary.manifest.coins_total,
                summary.total_pairs
            );
        }
        Command::Depth(_) => {
            let mut indexer = DepthIndexer::new(&config, client, store, clock);
            indexer.run().await?;
        }
    }
    Ok(())
}
