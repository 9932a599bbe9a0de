//! Startup plumbing shared by the binaries: `.env` loading, tracing and
//! turning command-line flags into an [`IndexerConfig`].

use crate::config::{IndexerConfig, Profile};
use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const CONFIG_PATH_ENV: &str = "PERPS_INDEXER_CONFIG";

/// Flags every binary accepts
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Run profile; `github` commits and pushes results
    #[arg(long, value_enum, default_value = "local", global = true)]
    pub profile: Profile,

    /// Path to TOML configuration file
    #[arg(short, long, env = CONFIG_PATH_ENV, global = true)]
    pub config: Option<PathBuf>,

    /// Override API key from environment
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Requests per minute; also sets the delay to 60000/N ms
    #[arg(long, global = true)]
    pub rate_limit: Option<u32>,

    /// Delay between requests in milliseconds (wins over --rate-limit)
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub utils_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,
}

impl CommonArgs {
    /// Profile defaults, then the config file, then the environment,
    /// then these flags
    pub fn resolve(&self) -> Result<IndexerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading config from {}", path.display());
                IndexerConfig::load_with_profile(self.profile, path)?
            }
            None => IndexerConfig::for_profile(self.profile),
        };
        config.apply_env();
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut IndexerConfig) {
        if let Some(key) = self.api_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                config.api.key = key.to_string();
            }
        }
        if let Some(rpm) = self.rate_limit {
            config.api.rate_limit.set_requests_per_minute(rpm);
        }
        if let Some(ms) = self.delay {
            config.api.rate_limit.delay_between_requests_ms = ms;
        }
        if let Some(dir) = &self.data_dir {
            config.data.base_dir = dir.clone();
        }
        if let Some(dir) = &self.utils_dir {
            config.data.utils_dir = dir.clone();
        }
        if self.no_progress {
            config.show_progress = false;
        }
    }
}

/// Loads `.env` from the working directory (and parents), then next to
/// the crate manifest
pub fn load_env() {
    let _ = dotenv::dotenv();

    let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if crate_env.exists() {
        let _ = dotenv::from_path(&crate_env);
    }
}

/// `RUST_LOG` wins; otherwise `perps_indexer=<level>`
pub fn init_tracing(level: &str) {
    let default_filter = format!("perps_indexer={},check_api={}", level, level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
