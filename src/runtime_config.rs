// =============================================================================
// Runtime Configuration — server settings with env overrides and atomic save
// =============================================================================
//
// Every field carries `#[serde(default)]` so that an older or partial config
// file still loads. Secrets (the upstream API key) come from the environment
// only and are never written back to disk.
//
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chart::ChartLayout;
use crate::types::StockCode;

/// Default config file name, overridable with `STOCKWATCH_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "stockwatch.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_watchlist_path() -> Option<PathBuf> {
    Some(PathBuf::from("watchlist.json"))
}

fn default_base_url() -> String {
    "https://www.quandl.com/api/v3".to_string()
}

fn default_dataset() -> String {
    "WIKI/PRICES".to_string()
}

fn default_lookback_months() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_push_interval_ms() -> u64 {
    500
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

// =============================================================================
// QuandlSettings
// =============================================================================

/// Upstream price API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct QuandlSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Datatable code, e.g. `WIKI/PRICES`.
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// How many months of history the chart shows.
    #[serde(default = "default_lookback_months")]
    pub lookback_months: u32,

    /// Upper bound on cursor pages followed for a single fetch.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Read from `QUANDL_API_KEY`; never persisted.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for QuandlSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            dataset: default_dataset(),
            lookback_months: default_lookback_months(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
            api_key: String::new(),
        }
    }
}

impl std::fmt::Debug for QuandlSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuandlSettings")
            .field("base_url", &self.base_url)
            .field("dataset", &self.dataset)
            .field("lookback_months", &self.lookback_months)
            .field("max_pages", &self.max_pages)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the Stockwatch server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Address the HTTP/WebSocket server listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Watch-list file. `null` keeps the watch-list in memory only.
    #[serde(default = "default_watchlist_path")]
    pub watchlist_path: Option<PathBuf>,

    #[serde(default)]
    pub quandl: QuandlSettings,

    #[serde(default)]
    pub chart: ChartLayout,

    /// How often each WebSocket checks for a newer dashboard.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,

    /// Period of the background re-fetch of all tracked stocks.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Stocks inserted when the watch-list starts out empty.
    #[serde(default)]
    pub seed_stocks: Vec<StockCode>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            watchlist_path: default_watchlist_path(),
            quandl: QuandlSettings::default(),
            chart: ChartLayout::default(),
            push_interval_ms: default_push_interval_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            seed_stocks: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("QUANDL_API_KEY") {
            self.quandl.api_key = key;
        }
        if let Some(url) = lookup("QUANDL_BASE_URL") {
            self.quandl.base_url = url;
        }
        if let Some(addr) = lookup("STOCKWATCH_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(path) = lookup("STOCKWATCH_DB_PATH") {
            let path = path.trim();
            self.watchlist_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(list) = lookup("STOCKWATCH_SEED_STOCKS") {
            self.seed_stocks = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| match s.parse::<StockCode>() {
                    Ok(code) => Some(code),
                    Err(e) => {
                        warn!(stock = %s, error = %e, "ignoring invalid seed stock");
                        None
                    }
                })
                .collect();
        }
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
