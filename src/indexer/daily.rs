//! Daily ticker indexing
//!
//! Refreshes the reference lists, snapshots pairs-markets for every
//! supported coin, writes the day's manifest and combined dump, then
//! commits and pushes.

use super::manifest::{DailyManifest, DailyRunManifest};
use super::progress::batch_bar;
use crate::clock::Clock;
use crate::config::IndexerConfig;
use crate::models::CombinedDump;
use crate::scrapers::CoinGlassClient;
use crate::store::{write_as, DataLayout, FileStore};
use crate::vcs::VersionControl;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct DailyRunSummary {
    pub date: String,
    pub total_pairs: usize,
    pub manifest: DailyManifest,
    pub committed: bool,
}

pub struct DailyIndexer {
    client: CoinGlassClient,
    store: Arc<dyn FileStore>,
    vcs: Arc<dyn VersionControl>,
    clock: Arc<dyn Clock>,
    layout: DataLayout,
    show_progress: bool,
}

impl DailyIndexer {
    pub fn new(
        config: &IndexerConfig,
        client: CoinGlassClient,
        store: Arc<dyn FileStore>,
        vcs: Arc<dyn VersionControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            store,
            vcs,
            clock,
            layout: DataLayout::from_config(&config.data),
            show_progress: config.show_progress,
        }
    }

    pub async fn run(&mut self) -> Result<DailyRunSummary> {
        self.initialize().await?;

        let date = self.clock.today();
        info!("🌅 Starting daily indexing for {}", date);

        let result = self.run_for_date(&date).await;
        match &result {
            Ok(_) => info!("🎉 Daily indexing completed successfully for {}!", date),
            Err(e) => error!("💥 Daily indexing failed for {}: {:#}", date, e),
        }
        result
    }

    pub async fn initialize(&self) -> Result<()> {
        info!("🚀 Initializing perps indexer...");
        self.store
            .ensure_dir(self.layout.utils_dir())
            .await
            .context("Failed to create utils directory")?;
        self.store
            .ensure_dir(self.layout.base_dir())
            .await
            .context("Failed to create data directory")?;
        self.vcs.configure().await;
        info!("✅ Initialization complete");
        Ok(())
    }

    async fn run_for_date(&mut self, date: &str) -> Result<DailyRunSummary> {
        let coins = self.update_supported_coins().await?;
        self.update_supported_pairs().await?;

        let (tickers, manifest) = self.fetch_ticker_data(&coins, date).await;

        let manifest_path = self.layout.daily_manifest(date);
        write_as(self.store.as_ref(), &manifest_path, &manifest)
            .await
            .context("Failed to save daily manifest")?;
        info!("📋 Manifest saved: {}", manifest_path.display());

        let combined_path = self.layout.combined_file(date);
        let total_pairs = tickers.len();
        let dump = CombinedDump {
            date: date.to_string(),
            total_pairs,
            data: tickers,
            manifest: manifest.clone(),
        };
        write_as(self.store.as_ref(), &combined_path, &dump)
            .await
            .context("Failed to save combined data")?;
        info!("📦 Combined data saved: {}", combined_path.display());

        let mut committed = false;
        if self.vcs.enabled() {
            let message = format!(
                "Daily index update {} - {}/{} coins",
                date, manifest.coins_succeeded, manifest.coins_total
            );
            committed = self.vcs.commit(&message).await;
            self.vcs.push().await;
        }

        Ok(DailyRunSummary {
            date: date.to_string(),
            total_pairs,
            manifest,
            committed,
        })
    }

    pub async fn update_supported_coins(&mut self) -> Result<Vec<String>> {
        info!("📊 Updating supported coins...");
        let coins = self
            .client
            .supported_coins()
            .await
            .context("Failed to update supported coins")?;

        let value = Value::from(coins.clone());
        let path = self.layout.supported_coins();
        if self.unchanged(&path, &value).await {
            info!("ℹ️ No changes in supported coins, skipping update");
            return Ok(coins);
        }

        self.store
            .write_json(&path, &value)
            .await
            .context("Failed to save supported coins")?;
        info!("✅ Updated supported coins: {} coins", coins.len());
        self.vcs.commit("Update supported coins list").await;
        Ok(coins)
    }

    /// Raw `data` of the supported exchange pairs endpoint
    pub async fn update_supported_pairs(&mut self) -> Result<Value> {
        info!("🔗 Updating supported exchange pairs...");
        let (raw, table) = self
            .client
            .supported_exchange_pairs()
            .await
            .context("Failed to update supported pairs")?;

        let path = self.layout.supported_pairs();
        if self.unchanged(&path, &raw).await {
            info!("ℹ️ No changes in supported pairs, skipping update");
            return Ok(raw);
        }

        self.store
            .write_json(&path, &raw)
            .await
            .context("Failed to save supported pairs")?;
        info!(
            "✅ Updated supported pairs: {} exchanges, {} pairs",
            table.exchange_count(),
            table.total_pairs()
        );
        self.vcs.commit("Update supported exchange pairs").await;
        Ok(raw)
    }

    /// Any read failure counts as "no existing data"
    async fn unchanged(&self, path: &Path, fresh: &Value) -> bool {
        match self.store.read_json(path).await {
            Ok(Some(existing)) => &existing == fresh,
            Ok(None) => false,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                false
            }
        }
    }

    /// One pairs-markets snapshot per coin. Failures are recorded, never
    /// propagated.
    pub async fn fetch_ticker_data(
        &mut self,
        coins: &[String],
        date: &str,
    ) -> (Vec<Value>, DailyManifest) {
        info!("📈 Fetching ticker data for {}...", date);
        let mut manifest = DailyRunManifest::start(coins.len() as u64, self.clock.clone());

        let rate = self.client.rate_limit_info();
        let estimated_minutes = coins.len() as f64 * rate.estimated_secs_per_item / 60.0;
        info!("⏱️ Estimated time: {:.1} minutes", estimated_minutes);

        let pb = batch_bar(coins.len() as u64, "coins", self.show_progress);
        let mut all = Vec::new();
        for coin in coins {
            pb.set_message(coin.clone());
            match self.fetch_coin(coin, date).await {
                Ok(entries) => {
                    all.extend(entries);
                    manifest.record_success();
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(coin = coin.as_str(), "❌ Failed to fetch data: {}", message);
                    manifest.record_failure(coin, &message);
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let manifest = manifest.finalize();
        info!(
            "✅ Ticker data fetch complete: {} succeeded, {} failed, {} total",
            manifest.coins_succeeded, manifest.coins_failed, manifest.coins_total
        );
        (all, manifest)
    }

    async fn fetch_coin(&mut self, coin: &str, date: &str) -> Result<Vec<Value>> {
        let payload = self.client.pairs_markets(coin).await?;
        let entries = payload
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| anyhow!("pairs-markets response for {} has no data array", coin))?;

        self.store
            .write_json(&self.layout.ticker_file(date, coin), &payload)
            .await
            .context("Failed to save ticker file")?;
        Ok(entries)
    }
}
