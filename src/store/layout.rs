//! Paths of every file the indexer reads or writes.

use crate::config::DataConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DataLayout {
    base_dir: PathBuf,
    utils_dir: PathBuf,
}

impl DataLayout {
    pub fn new(base_dir: impl Into<PathBuf>, utils_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            utils_dir: utils_dir.into(),
        }
    }

    pub fn from_config(data: &DataConfig) -> Self {
        Self::new(&data.base_dir, &data.utils_dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn utils_dir(&self) -> &Path {
        &self.utils_dir
    }

    pub fn supported_coins(&self) -> PathBuf {
        self.utils_dir.join("supported_coins.json")
    }

    pub fn supported_pairs(&self) -> PathBuf {
        self.utils_dir.join("supported_pairs.json")
    }

    pub fn pairs_not_on_reference(&self) -> PathBuf {
        self.utils_dir.join("pairs_not_on_dydx.json")
    }

    pub fn depth_dir(&self) -> PathBuf {
        self.base_dir.join("futures").join("depth")
    }

    pub fn depth_manifest(&self) -> PathBuf {
        self.depth_dir().join("_manifest.json")
    }

    pub fn depth_file(&self, instrument_id: &str, exchange: &str) -> PathBuf {
        self.depth_dir()
            .join(format!("{}_{}.json", sanitize(instrument_id), sanitize(exchange)))
    }

    pub fn day_dir(&self, date: &str) -> PathBuf {
        self.base_dir.join("futures").join(date)
    }

    pub fn ticker_file(&self, date: &str, symbol: &str) -> PathBuf {
        self.day_dir(date)
            .join("ticker")
            .join(format!("{}.json", sanitize(symbol)))
    }

    pub fn daily_manifest(&self, date: &str) -> PathBuf {
        self.day_dir(date).join("_manifest.json")
    }

    pub fn combined_file(&self, date: &str) -> PathBuf {
        self.day_dir(date).join(format!("combined_{}.json", date))
    }
}

/// Instrument ids like `BTC/USDT` must not escape the target directory
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c => c,
        })
        .collect()
}
