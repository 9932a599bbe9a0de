//! Indexer configuration
//!
//! Profile defaults, optionally overlaid by a TOML file, then by the
//! environment. CLI flags are applied last by the binaries.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const COINGLASS_API_BASE: &str = "https://open-api-v4.coinglass.com";

/// Where the run happens; decides whether results are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Local,
    Github,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Draw progress bars for batch loops
    #[serde(default = "default_true")]
    pub show_progress: bool,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub depth: DepthConfig,
}

fn default_true() -> bool {
    true
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(b)), toml::Value::Table(o)) => merge_tables(b, o),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Local)
    }
}

impl IndexerConfig {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            show_progress: true,
            api: ApiConfig::default(),
            data: DataConfig::default(),
            git: match profile {
                Profile::Local => GitConfig::default(),
                Profile::Github => GitConfig::github_actions(),
            },
            depth: DepthConfig::default(),
        }
    }

    /// Profile defaults with a TOML file laid over them. Keys the file
    /// leaves out keep the profile's value.
    pub fn load_with_profile(profile: Profile, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let overlay: toml::Table = toml::from_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        let toml::Value::Table(mut base) = toml::Value::try_from(Self::for_profile(profile))?
        else {
            bail!("profile defaults did not serialize to a table");
        };
        merge_tables(&mut base, overlay);
        let config: Self = toml::Value::Table(base)
            .try_into()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Apply `COINGLASS_API_KEY` and the rate-limit overrides
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("COINGLASS_API_KEY") {
            if !key.trim().is_empty() {
                self.api.key = key.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_REQUESTS_PER_MINUTE") {
            if let Ok(rpm) = v.parse::<u32>() {
                self.api.rate_limit.set_requests_per_minute(rpm);
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_DELAY_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.api.rate_limit.delay_between_requests_ms = ms;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.key.trim().is_empty() {
            bail!(
                "API key is required. Set COINGLASS_API_KEY environment variable or use --api-key option."
            );
        }
        if self.api.rate_limit.requests_per_minute == 0 {
            bail!("requests_per_minute must be greater than zero");
        }
        if self.depth.candidate_exchanges.is_empty() {
            bail!("at least one candidate exchange is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Never serialized back out
    #[serde(default, skip_serializing)]
    pub key: String,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_base_url() -> String {
    COINGLASS_API_BASE.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            key: String::new(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ApiConfig {
    /// `abcd1234...wxyz`, safe for logs
    pub fn masked_key(&self) -> String {
        let key = self.key.as_str();
        if key.len() <= 12 || !key.is_ascii() {
            return "****".to_string();
        }
        format!("{}...{}", &key[..8], &key[key.len() - 4..])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Minimum spacing between two requests (ms)
    #[serde(default = "default_delay_ms")]
    pub delay_between_requests_ms: u64,
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_delay_ms() -> u64 {
    2000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            delay_between_requests_ms: default_delay_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Sets the rate and derives the delay from it
    pub fn set_requests_per_minute(&mut self, rpm: u32) {
        if rpm == 0 {
            return;
        }
        self.requests_per_minute = rpm;
        self.delay_between_requests_ms = 60_000 / rpm as u64;
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_between_requests_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_utils_dir")]
    pub utils_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_utils_dir() -> PathBuf {
    PathBuf::from("./utils")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            utils_dir: default_utils_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    #[serde(default = "default_bot_email")]
    pub bot_email: String,

    /// Repository the commands run in; defaults to the current directory
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_bot_name() -> String {
    "Perps Indexer Bot".to_string()
}

fn default_bot_email() -> String {
    "bot@perps-indexer.com".to_string()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_name: default_bot_name(),
            bot_email: default_bot_email(),
            workdir: None,
        }
    }
}

impl GitConfig {
    pub fn github_actions() -> Self {
        Self {
            enabled: true,
            bot_name: "gh-actions".to_string(),
            bot_email: "actions@users.noreply.github.com".to_string(),
            workdir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthConfig {
    /// Base assets listed here are excluded from the backfill
    #[serde(default = "default_reference_exchange")]
    pub reference_exchange: String,

    #[serde(default = "default_candidate_exchanges")]
    pub candidate_exchanges: Vec<String>,

    /// Minimum number of candidate exchanges a base asset must be listed on
    #[serde(default = "default_min_exchange_count")]
    pub min_exchange_count: usize,

    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default = "default_range")]
    pub range: u32,

    /// Caps pairs per exchange before the threshold step (smoke runs)
    #[serde(default)]
    pub max_pairs_per_exchange: Option<usize>,
}

fn default_reference_exchange() -> String {
    "dYdX".to_string()
}

fn default_candidate_exchanges() -> Vec<String> {
    [
        "Binance",
        "Bybit",
        "Coinbase",
        "Kraken",
        "MEXC",
        "Gate",
        "Hyperliquid",
        "KuCoin",
        "OKX",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_exchange_count() -> usize {
    crate::indexer::pair_selector::DEFAULT_MIN_EXCHANGE_COUNT
}

fn default_interval() -> String {
    "1d".to_string()
}

fn default_range() -> u32 {
    2
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            reference_exchange: default_reference_exchange(),
            candidate_exchanges: default_candidate_exchanges(),
            min_exchange_count: default_min_exchange_count(),
            interval: default_interval(),
            range: default_range(),
            max_pairs_per_exchange: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndexerConfig::default();
        assert_eq!(config.api.base_url, COINGLASS_API_BASE);
        assert_eq!(config.api.rate_limit.requests_per_minute, 30);
        assert_eq!(config.api.rate_limit.delay(), Duration::from_millis(2000));
        assert_eq!(config.depth.min_exchange_count, 4);
        assert_eq!(config.depth.candidate_exchanges.len(), 9);
        assert!(!config.git.enabled);
    }

    #[test]
    fn test_github_profile_enables_git() {
        let config = IndexerConfig::for_profile(Profile::Github);
        assert!(config.git.enabled);
        assert_eq!(config.git.bot_name, "gh-actions");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: IndexerConfig = toml::from_str(
            r#"
            [api.rate_limit]
            delay_between_requests_ms = 500

            [depth]
            candidate_exchanges = ["Binance", "Bybit"]
            max_pairs_per_exchange = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.api.rate_limit.delay_between_requests_ms, 500);
        assert_eq!(config.api.rate_limit.requests_per_minute, 30);
        assert_eq!(config.depth.candidate_exchanges, vec!["Binance", "Bybit"]);
        assert_eq!(config.depth.max_pairs_per_exchange, Some(3));
        assert_eq!(config.depth.reference_exchange, "dYdX");
        assert!(config.show_progress);
    }

    #[test]
    fn test_toml_roundtrip_drops_key() {
        let mut config = IndexerConfig::default();
        config.api.key = "secret-key-value".to_string();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(!toml.contains("secret-key-value"));
        let parsed: IndexerConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.depth.interval, "1d");
        assert!(parsed.api.key.is_empty());
    }

    #[test]
    fn test_file_overlays_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"[git]\nbot_email = \"ci@example.com\"\n\n[depth]\nrange = 5\n",
        )
        .unwrap();

        let config = IndexerConfig::load_with_profile(Profile::Github, file.path()).unwrap();
        assert!(config.git.enabled);
        assert_eq!(config.git.bot_name, "gh-actions");
        assert_eq!(config.git.bot_email, "ci@example.com");
        assert_eq!(config.depth.range, 5);
        assert_eq!(config.depth.interval, "1d");
    }

    #[test]
    fn test_rate_derives_delay() {
        let mut rl = RateLimitConfig::default();
        rl.set_requests_per_minute(60);
        assert_eq!(rl.delay_between_requests_ms, 1000);
        rl.set_requests_per_minute(0);
        assert_eq!(rl.requests_per_minute, 60);
    }

    #[test]
    fn test_validate_requires_key() {
        let mut config = IndexerConfig::default();
        assert!(config.validate().is_err());
        config.api.key = "abc".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_masked_key() {
        let mut api = ApiConfig::default();
        api.key = "0123456789abcdefWXYZ".to_string();
        assert_eq!(api.masked_key(), "01234567...WXYZ");
        api.key = "short".to_string();
        assert_eq!(api.masked_key(), "****");
    }
}
