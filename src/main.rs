// =============================================================================
// Stockwatch — Main Entry Point
// =============================================================================
//
// Serves the watch-list dashboard: REST + WebSocket on one axum listener,
// with a background loop that re-fetches prices for every tracked stock.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod chart;
mod quandl;
mod runtime_config;
mod store;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::quandl::QuandlClient;
use crate::runtime_config::{RuntimeConfig, DEFAULT_CONFIG_PATH};
use crate::store::{JsonFileStore, MemoryStore, WatchlistStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Stockwatch starting up");

    let config_path = std::env::var("STOCKWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = if config_path.exists() {
        RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            RuntimeConfig::default()
        })
    } else {
        let config = RuntimeConfig::default();
        if let Err(e) = config.save(&config_path) {
            warn!(error = %e, "Failed to write default config");
        }
        config
    };
    config.apply_env(|key| std::env::var(key).ok());

    // ── 2. Watch-list store ──────────────────────────────────────────────
    let store: Arc<dyn WatchlistStore> = match &config.watchlist_path {
        Some(path) => Arc::new(JsonFileStore::open(path)?),
        None => {
            warn!("No watch-list file configured — changes will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // ── 3. Shared state ──────────────────────────────────────────────────
    let quandl = QuandlClient::new(config.quandl.clone())?;
    let state = Arc::new(AppState::new(config, store, quandl));

    let seeds = state.config.seed_stocks.clone();
    state.seed_if_empty(&seeds)?;

    match state.refresh().await {
        Ok(dash) => info!(stocks = dash.stocks.len(), "Initial dashboard ready"),
        Err(e) => {
            // Clients retry through `dashboard_or_refresh`.
            warn!(error = %e, "Initial price fetch failed");
            state.push_error(format!("initial fetch failed: {e:#}"));
        }
    }

    // ── 4. Periodic refresh loop ─────────────────────────────────────────
    let refresh_state = state.clone();
    let refresh_secs = state.config.refresh_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(refresh_secs));
        // The first tick fires immediately; the dashboard was just built.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = refresh_state.refresh().await {
                error!(error = %e, "Scheduled refresh failed");
                refresh_state.push_error(format!("scheduled refresh failed: {e:#}"));
            }
        }
    });

    // ── 5. API server ────────────────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "Listening");

    // ── 6. Serve until Ctrl+C ────────────────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received — stopping gracefully");
        })
        .await
        .context("API server failed")?;

    info!("Stockwatch shut down complete.");
    Ok(())
}
