// =============================================================================
// Shared types used across Stockwatch
// =============================================================================

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Longest ticker the watch-list accepts (matches the client input field).
pub const MAX_STOCK_CODE_LEN: usize = 5;

/// A validated, upper-cased ticker symbol such as `AAPL` or `BRK.A`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StockCode(String);

impl StockCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for StockCode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            anyhow::bail!("stock code is empty");
        }
        if code.chars().count() > MAX_STOCK_CODE_LEN {
            anyhow::bail!("stock code '{code}' is longer than {MAX_STOCK_CODE_LEN} characters");
        }
        if let Some(bad) = code
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_'))
        {
            anyhow::bail!("stock code '{code}' contains invalid character '{bad}'");
        }
        Ok(Self(code))
    }
}

impl<'de> Deserialize<'de> for StockCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for StockCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One sampled opening price for a ticker on a trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ticker: String,
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(ticker: impl Into<String>, date: NaiveDate, price: f64) -> Self {
        Self {
            ticker: ticker.into(),
            date,
            price,
        }
    }

    /// Midnight UTC of `date` as Unix milliseconds. Used as the chart x value.
    pub fn timestamp_ms(&self) -> f64 {
        date_to_ms(self.date)
    }
}

/// Midnight UTC of `date` as Unix milliseconds.
pub fn date_to_ms(date: NaiveDate) -> f64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
        .unwrap_or_default()
}
