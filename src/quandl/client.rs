// =============================================================================
// Quandl REST Client — datatable price queries
// =============================================================================
//
// SECURITY: the API key travels as the `api_key` query parameter, so request
// URLs are never logged in full and the key is redacted from `Debug`.
// =============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::{DateRange, PriceTable, PRICE_COLUMNS};
use crate::runtime_config::QuandlSettings;
use crate::types::StockCode;

/// Query-string date format accepted by the datatable API.
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct QuandlClient {
    settings: QuandlSettings,
    client: reqwest::Client,
}

impl QuandlClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(settings: QuandlSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        if settings.api_key.is_empty() {
            warn!("QUANDL_API_KEY is not set, requests will be anonymous and rate limited");
        }
        debug!(
            base_url = %settings.base_url,
            dataset = %settings.dataset,
            "QuandlClient initialised"
        );

        Ok(Self { settings, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/datatables/{}.json",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.dataset
        )
    }

    /// The default window: `lookback_months` up to today (UTC).
    pub fn default_range(&self) -> DateRange {
        DateRange::trailing_months(Utc::now().date_naive(), self.settings.lookback_months)
    }

    // -------------------------------------------------------------------------
    // Prices
    // -------------------------------------------------------------------------

    /// Fetch opening prices for `stocks` over the default window.
    pub async fn fetch_recent(&self, stocks: &[StockCode]) -> Result<PriceTable> {
        self.fetch_prices(stocks, &self.default_range()).await
    }

    /// GET /datatables/{dataset}.json for `stocks` within `range`.
    ///
    /// Follows `meta.next_cursor_id` until the last page or `max_pages`.
    /// An empty stock list short-circuits to an empty table.
    #[instrument(skip(self, stocks), fields(stocks = stocks.len()), name = "quandl::fetch_prices")]
    pub async fn fetch_prices(
        &self,
        stocks: &[StockCode],
        range: &DateRange,
    ) -> Result<PriceTable> {
        if stocks.is_empty() {
            return Ok(PriceTable::default());
        }

        let tickers = stocks
            .iter()
            .map(StockCode::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut table = PriceTable::default();
        let mut cursor: Option<String> = None;

        for page in 0..self.settings.max_pages.max(1) {
            let mut body = self.fetch_page(&tickers, range, cursor.as_deref()).await?;

            if page == 0 {
                table.datatable.columns = std::mem::take(&mut body.datatable.columns);
            }
            table.datatable.data.append(&mut body.datatable.data);
            cursor = body.meta.next_cursor_id.filter(|c| !c.is_empty());

            if cursor.is_none() {
                break;
            }
        }

        if cursor.is_some() {
            warn!(
                max_pages = self.settings.max_pages,
                rows = table.datatable.data.len(),
                "page limit reached — price data truncated"
            );
        }

        debug!(tickers = %tickers, rows = table.datatable.data.len(), "prices fetched");
        Ok(table)
    }

    async fn fetch_page(
        &self,
        tickers: &str,
        range: &DateRange,
        cursor: Option<&str>,
    ) -> Result<PriceTable> {
        let mut query: Vec<(&str, String)> = vec![
            ("ticker", tickers.to_string()),
            ("date.gte", range.gte.format(DATE_FORMAT).to_string()),
            ("date.lt", range.lt.format(DATE_FORMAT).to_string()),
            ("qopts.columns", PRICE_COLUMNS.to_string()),
        ];
        if !self.settings.api_key.is_empty() {
            query.push(("api_key", self.settings.api_key.clone()));
        }
        if let Some(c) = cursor {
            query.push(("qopts.cursor_id", c.to_string()));
        }

        let resp = self
            .client
            .get(self.endpoint())
            .query(&query)
            .send()
            .await
            .context("GET datatable request failed")?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("failed to read datatable response")?;

        // Gateways answer outages with HTML; keep the status in the error.
        let body: serde_json::Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                anyhow::bail!("Quandl datatable request returned {status}: {}", excerpt(&text))
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to parse datatable response ({status})"))
            }
        };

        if let Some(err) = body.get("quandl_error") {
            let code = err.get("code").and_then(|v| v.as_str()).unwrap_or("unknown");
            let message = err.get("message").and_then(|v| v.as_str()).unwrap_or("");
            anyhow::bail!("Quandl returned {status} ({code}): {message}");
        }
        if !status.is_success() {
            anyhow::bail!("Quandl datatable request returned {status}: {body}");
        }

        serde_json::from_value(body).context("unexpected datatable response shape")
    }
}

/// First line of an error body, capped for logging.
fn excerpt(text: &str) -> String {
    const MAX: usize = 200;
    let line = text.trim().lines().next().unwrap_or_default();
    line.chars().take(MAX).collect()
}

impl std::fmt::Debug for QuandlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuandlClient")
            .field("settings", &self.settings)
            .finish()
    }
}
