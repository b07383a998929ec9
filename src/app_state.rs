// =============================================================================
// Central Application State — Stockwatch
// =============================================================================
//
// Ties the watch-list store, the upstream price client and the latest
// rendered dashboard together. Every watch-list mutation re-fetches prices
// for the whole list and publishes a new dashboard under a new state version;
// the WebSocket feed watches that version and pushes to every client.
//
// Thread safety:
//   - `refresh_lock` (tokio Mutex) serialises mutations + refetches so that
//     dashboards are published in the same order the watch-list changed.
//   - parking_lot::RwLock for the published dashboard and the error log.
//   - Atomic counters for the state version and connection bookkeeping.
// =============================================================================

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chart::{series, ChartModel, Palette, Series, Tooltip};
use crate::quandl::{PriceTable, QuandlClient};
use crate::runtime_config::RuntimeConfig;
use crate::store::WatchlistStore;
use crate::types::StockCode;

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// Error markers
// =============================================================================

/// Context attached to failures of the upstream price API, so the HTTP layer
/// can tell them apart from local (store) failures.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamUnavailable;

impl std::fmt::Display for UpstreamUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("price data provider request failed")
    }
}

/// A recorded error event, exposed through the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// Dashboard
// =============================================================================

/// One published view of the watch-list: raw upstream data, the stock list,
/// the per-stock series and the laid-out chart.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub version: u64,
    pub data: PriceTable,
    pub stocks: Vec<StockCode>,
    pub series: Vec<Series>,
    pub chart: ChartModel,
    pub fetched_at: DateTime<Utc>,
}

/// Body of `GET /api/stocks`.
#[derive(Debug, Clone, Serialize)]
pub struct StocksPayload<'a> {
    pub data: &'a PriceTable,
    pub stocks: &'a [StockCode],
}

impl Dashboard {
    pub fn payload(&self) -> StocksPayload<'_> {
        StocksPayload {
            data: &self.data,
            stocks: &self.stocks,
        }
    }
}

// =============================================================================
// Operation outcomes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Added(StockCode),
    Rejected(Rejection),
}

/// Why a submitted code was not added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    AlreadyTracked(StockCode),
    /// Unparsable, or unknown to the price provider.
    Invalid(String),
}

impl Rejection {
    /// The normalised code that was rejected.
    pub fn stock(&self) -> &str {
        match self {
            Self::AlreadyTracked(code) => code.as_str(),
            Self::Invalid(raw) => raw,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::AlreadyTracked(code) => format!("'{code}' is already shown."),
            Self::Invalid(raw) => format!("'{raw}' is not a valid stock code."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed(StockCode),
    NotTracked(String),
}

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Bumped every time a new dashboard is published.
    pub state_version: AtomicU64,
    /// Total WebSocket messages sent, across all connections.
    pub ws_sequence_number: AtomicU64,
    pub connected_clients: AtomicUsize,

    pub config: RuntimeConfig,
    pub store: Arc<dyn WatchlistStore>,
    pub quandl: QuandlClient,
    pub palette: Palette,

    dashboard: RwLock<Option<Arc<Dashboard>>>,
    refresh_lock: tokio::sync::Mutex<()>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        store: Arc<dyn WatchlistStore>,
        quandl: QuandlClient,
    ) -> Self {
        Self {
            state_version: AtomicU64::new(0),
            ws_sequence_number: AtomicU64::new(0),
            connected_clients: AtomicUsize::new(0),
            config,
            store,
            quandl,
            palette: Palette::new(),
            dashboard: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Version of the latest published dashboard; 0 before the first one.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. The log is capped at [`MAX_RECENT_ERRORS`];
    /// oldest entries are evicted first.
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    // ── Dashboard ───────────────────────────────────────────────────────

    pub fn dashboard(&self) -> Option<Arc<Dashboard>> {
        self.dashboard.read().clone()
    }

    /// The published dashboard, building the first one on demand.
    pub async fn dashboard_or_refresh(&self) -> Result<Arc<Dashboard>> {
        if let Some(dash) = self.dashboard() {
            return Ok(dash);
        }
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have published while we waited.
        if let Some(dash) = self.dashboard() {
            return Ok(dash);
        }
        self.refresh_locked().await
    }

    /// Re-fetch prices for the whole watch-list and publish a new dashboard.
    pub async fn refresh(&self) -> Result<Arc<Dashboard>> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<Arc<Dashboard>> {
        let stocks = self.store.stocks().context("failed to read watch-list")?;
        let data = self
            .quandl
            .fetch_recent(&stocks)
            .await
            .context(UpstreamUnavailable)?;

        let points = data.points();
        let series = series::split_by_stock(&points, &stocks);
        let chart = ChartModel::build(&self.config.chart, &series, &self.palette);

        // Publish the dashboard before the version so a pusher that sees the
        // new version always finds the matching dashboard.
        let version = self.current_state_version() + 1;
        let dash = Arc::new(Dashboard {
            version,
            data,
            stocks,
            series,
            chart,
            fetched_at: Utc::now(),
        });
        *self.dashboard.write() = Some(dash.clone());
        self.state_version.store(version, Ordering::SeqCst);

        info!(
            version,
            stocks = dash.stocks.len(),
            rows = dash.data.datatable.data.len(),
            "dashboard published"
        );
        Ok(dash)
    }

    // ── Watch-list operations ───────────────────────────────────────────

    /// Insert `stocks` into an empty watch-list. Returns how many were added.
    pub fn seed_if_empty(&self, stocks: &[StockCode]) -> Result<usize> {
        if stocks.is_empty() || !self.store.list()?.is_empty() {
            return Ok(0);
        }
        let mut added = 0;
        for stock in stocks {
            if self.store.insert(stock.clone())?.is_some() {
                added += 1;
            }
        }
        info!(added, "watch-list seeded");
        Ok(added)
    }

    /// Validate `raw` against the price provider and add it to the watch-list.
    pub async fn submit_stock(&self, raw: &str) -> Result<SubmitOutcome> {
        let code: StockCode = match raw.parse() {
            Ok(code) => code,
            Err(e) => {
                debug!(raw = %raw, error = %e, "rejected malformed stock code");
                return Ok(SubmitOutcome::Rejected(Rejection::Invalid(
                    raw.trim().to_uppercase(),
                )));
            }
        };

        let _guard = self.refresh_lock.lock().await;

        if self.store.contains(&code)? {
            return Ok(SubmitOutcome::Rejected(Rejection::AlreadyTracked(code)));
        }

        let probe = self
            .quandl
            .fetch_recent(std::slice::from_ref(&code))
            .await
            .context(UpstreamUnavailable)?;
        if probe.points().is_empty() {
            info!(stock = %code, "stock unknown to price provider");
            return Ok(SubmitOutcome::Rejected(Rejection::Invalid(code.to_string())));
        }

        if self.store.insert(code.clone())?.is_none() {
            return Ok(SubmitOutcome::Rejected(Rejection::AlreadyTracked(code)));
        }
        info!(stock = %code, "stock added to watch-list");

        if let Err(e) = self.refresh_locked().await {
            // The stock is stored; the next successful refresh will show it.
            warn!(stock = %code, error = %e, "refresh after insert failed");
            self.push_error(format!("refresh after adding {code} failed: {e:#}"));
            return Err(e);
        }
        Ok(SubmitOutcome::Added(code))
    }

    /// Remove `raw` from the watch-list.
    pub async fn delete_stock(&self, raw: &str) -> Result<DeleteOutcome> {
        let Ok(code) = raw.parse::<StockCode>() else {
            return Ok(DeleteOutcome::NotTracked(raw.trim().to_uppercase()));
        };

        let _guard = self.refresh_lock.lock().await;

        let Some(doc) = self.store.remove(&code)? else {
            return Ok(DeleteOutcome::NotTracked(code.to_string()));
        };
        self.palette.release(doc.stock.as_str());
        info!(stock = %doc.stock, id = %doc.id, "stock removed from watch-list");

        if let Err(e) = self.refresh_locked().await {
            warn!(stock = %code, error = %e, "refresh after delete failed");
            self.push_error(format!("refresh after removing {code} failed: {e:#}"));
            return Err(e);
        }
        Ok(DeleteOutcome::Removed(doc.stock))
    }

    // ── Chart ───────────────────────────────────────────────────────────

    pub async fn chart_model(&self) -> Result<ChartModel> {
        Ok(self.dashboard_or_refresh().await?.chart.clone())
    }

    /// Tooltip for a cursor at plot-area coordinates, if there is data.
    pub fn tooltip(&self, x: f64, y: f64) -> Option<Tooltip> {
        self.dashboard()?.chart.tooltip(&self.palette, x, y)
    }

    // ── Health ──────────────────────────────────────────────────────────

    pub fn build_health(&self) -> HealthSnapshot {
        let dash = self.dashboard();
        HealthSnapshot {
            status: "ok",
            state_version: self.current_state_version(),
            stocks: dash.as_ref().map_or(0, |d| d.stocks.len()),
            last_fetch_at: dash.as_ref().map(|d| d.fetched_at.to_rfc3339()),
            connected_clients: self.connected_clients.load(Ordering::Relaxed),
            ws_sequence_number: self.ws_sequence_number.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
            server_time: Utc::now().timestamp_millis(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub state_version: u64,
    pub stocks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch_at: Option<String>,
    pub connected_clients: usize,
    pub ws_sequence_number: u64,
    pub uptime_secs: u64,
    pub server_time: i64,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// Tests
// =============================================================================
