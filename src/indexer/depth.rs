//! Order-book depth backfill
//!
//! Selects the pairs missing from the reference exchange and merges their
//! ask/bid history into one file per instrument and exchange. Outcomes
//! accumulate in `futures/depth/_manifest.json` across runs.

use super::manifest::{DepthManifest, RunManifest};
use super::merge::{annotate, merge};
use super::pair_selector::{apply_exchange_threshold, cap_pairs_per_exchange, exclusion_table};
use super::progress::batch_bar;
use crate::clock::Clock;
use crate::config::{DepthConfig, IndexerConfig};
use crate::models::{DepthRecord, ExchangePairTable, Pair};
use crate::scrapers::CoinGlassClient;
use crate::store::{read_as, write_as, DataLayout, FileStore};
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DepthRunSummary {
    pub total_pairs: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub manifest: DepthManifest,
}

pub struct DepthIndexer {
    client: CoinGlassClient,
    store: Arc<dyn FileStore>,
    clock: Arc<dyn Clock>,
    layout: DataLayout,
    config: DepthConfig,
    has_api_key: bool,
    show_progress: bool,
}

impl DepthIndexer {
    pub fn new(
        config: &IndexerConfig,
        client: CoinGlassClient,
        store: Arc<dyn FileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            store,
            clock,
            layout: DataLayout::from_config(&config.data),
            config: config.depth.clone(),
            has_api_key: !config.api.key.trim().is_empty(),
            show_progress: config.show_progress,
        }
    }

    pub async fn run(&mut self) -> Result<DepthRunSummary> {
        info!("🚀 Starting {} depth indexer", self.config.reference_exchange);
        info!("⏰ Started at: {}", self.clock.now().to_rfc3339());

        let mut manifest = self.initialize().await?;

        let table = self.load_pair_table().await?;
        let selected = self.select(&table);
        write_as(
            self.store.as_ref(),
            &self.layout.pairs_not_on_reference(),
            &selected,
        )
        .await
        .context("Failed to save selected pairs")?;

        let total = selected.total_pairs() as u64;
        manifest.set_total_pairs(total);
        info!(
            "✅ Found {} pairs not on {} and listed on {}+ exchanges across {} exchanges",
            total,
            self.config.reference_exchange,
            self.config.min_exchange_count,
            selected.exchange_count()
        );

        let (succeeded, failed) = self.process_pairs(&selected, &mut manifest).await;

        let snapshot = manifest.finalize();
        self.save_manifest(&snapshot).await;

        info!("📋 Summary:");
        info!("🎯 Total pairs to process: {}", snapshot.total_pairs);
        info!("✅ Successfully processed: {}", succeeded);
        info!("❌ Failed: {}", failed);
        info!("📁 Data saved to: {}", self.layout.depth_dir().display());
        if failed > 0 {
            info!(
                "📝 Check {} for error details",
                self.layout.depth_manifest().display()
            );
        }

        Ok(DepthRunSummary {
            total_pairs: snapshot.total_pairs,
            succeeded,
            failed,
            manifest: snapshot,
        })
    }

    /// Checks the key, creates the depth directory and loads the manifest
    async fn initialize(&self) -> Result<RunManifest> {
        if !self.has_api_key {
            bail!("No CoinGlass API key found. Set COINGLASS_API_KEY or pass --api-key.");
        }
        let depth_dir = self.layout.depth_dir();
        self.store
            .ensure_dir(&depth_dir)
            .await
            .context("Failed to create depth directory")?;

        let manifest = self.load_manifest().await;
        info!("📁 Depth data directory: {}", depth_dir.display());
        info!(
            "🎯 Target exchanges: {}",
            self.config.candidate_exchanges.join(", ")
        );
        Ok(manifest)
    }

    /// Resumes the saved manifest, or starts and saves a fresh one
    async fn load_manifest(&self) -> RunManifest {
        let path = self.layout.depth_manifest();
        match read_as::<DepthManifest>(self.store.as_ref(), &path).await {
            Ok(Some(previous)) => {
                debug!(
                    failed_pairs = previous.failed_pairs.len(),
                    "Resuming depth manifest"
                );
                return RunManifest::resume(previous, self.clock.clone());
            }
            Ok(None) => {}
            Err(e) => warn!("Existing depth manifest unreadable, starting fresh: {}", e),
        }
        let manifest = RunManifest::new(self.clock.clone());
        self.save_manifest(manifest.snapshot()).await;
        manifest
    }

    async fn save_manifest(&self, manifest: &DepthManifest) {
        if let Err(e) = write_as(self.store.as_ref(), &self.layout.depth_manifest(), manifest).await
        {
            error!("❌ Failed to save manifest: {}", e);
        }
    }

    /// `supported_pairs.json`, fetched and written first if missing
    pub async fn load_pair_table(&mut self) -> Result<ExchangePairTable> {
        let path = self.layout.supported_pairs();
        if let Some(table) = read_as::<ExchangePairTable>(self.store.as_ref(), &path)
            .await
            .context("Failed to read supported pairs")?
        {
            return Ok(table);
        }

        info!("🔗 {} missing, fetching from API", path.display());
        let (raw, table) = self
            .client
            .supported_exchange_pairs()
            .await
            .context("Failed to fetch supported exchange pairs")?;
        self.store
            .write_json(&path, &raw)
            .await
            .context("Failed to save supported pairs")?;
        Ok(table)
    }

    /// Exclusion against the reference, then the threshold. With a
    /// per-exchange cap (test mode) the threshold is skipped and the first
    /// `max` excluded pairs of each exchange are taken.
    pub fn select(&self, table: &ExchangePairTable) -> ExchangePairTable {
        info!(
            "🔍 Finding pairs not listed on {}...",
            self.config.reference_exchange
        );
        let candidates = exclusion_table(
            table,
            &self.config.reference_exchange,
            &self.config.candidate_exchanges,
        );
        match self.config.max_pairs_per_exchange {
            Some(max) => {
                info!(
                    "🧪 Test mode: first {} pairs per exchange, {}+ exchange threshold skipped",
                    max, self.config.min_exchange_count
                );
                cap_pairs_per_exchange(&candidates, max)
            }
            None => apply_exchange_threshold(&candidates, self.config.min_exchange_count),
        }
    }

    async fn process_pairs(
        &mut self,
        selected: &ExchangePairTable,
        manifest: &mut RunManifest,
    ) -> (u64, u64) {
        info!("🔄 Processing pairs for depth data...");
        let pb = batch_bar(selected.total_pairs() as u64, "pairs", self.show_progress);

        let mut succeeded = 0u64;
        let mut failed = 0u64;
        for (exchange, pairs) in selected.iter() {
            for pair in pairs {
                pb.set_message(format!("{} ({})", pair.instrument_id, exchange));
                match self.process_pair(pair, exchange).await {
                    Ok(count) => {
                        debug!(
                            exchange,
                            instrument_id = pair.instrument_id.as_str(),
                            count,
                            "Depth data saved"
                        );
                        manifest.record_success(exchange);
                        succeeded += 1;
                    }
                    Err(e) => {
                        let message = format!("{e:#}");
                        error!(
                            exchange,
                            instrument_id = pair.instrument_id.as_str(),
                            "❌ Failed to process pair: {}",
                            message
                        );
                        manifest.record_failure(exchange, &pair.instrument_id, &message);
                        failed += 1;
                    }
                }
                pb.inc(1);
            }
        }
        pb.finish_and_clear();

        info!(
            "✅ Processing complete! Success: {}, Errors: {}, Total: {}",
            succeeded,
            failed,
            manifest.processed()
        );
        (succeeded, failed)
    }

    /// Fetch, annotate and merge one pair. Returns the stored record count.
    pub async fn process_pair(&mut self, pair: &Pair, exchange: &str) -> Result<usize> {
        let points = self
            .client
            .depth_history(
                exchange,
                &pair.instrument_id,
                &self.config.interval,
                self.config.range,
            )
            .await?;
        if points.is_empty() {
            return Err(anyhow!("Invalid API response: No data"));
        }
        debug!(
            "📊 Processing {} depth data entries for {} on {}",
            points.len(),
            pair.instrument_id,
            exchange
        );

        let path = self.layout.depth_file(&pair.instrument_id, exchange);
        let existing = match read_as::<Vec<DepthRecord>>(self.store.as_ref(), &path).await {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable depth file: {}", e);
                Vec::new()
            }
        };

        let incoming = annotate(points, pair, exchange, self.clock.now());
        let merged = merge(existing, incoming);
        write_as(self.store.as_ref(), &path, &merged)
            .await
            .context("Failed to save depth data")?;
        Ok(merged.len())
    }
}
