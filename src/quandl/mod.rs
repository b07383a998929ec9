// =============================================================================
// Quandl datatable API — price data for the watch-list
// =============================================================================

pub mod client;
#[cfg(test)]
pub mod fake;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::PricePoint;

pub use client::QuandlClient;

/// Columns requested from the datatable, in row order.
pub const PRICE_COLUMNS: &str = "ticker,date,open";

/// Half-open date window `[gte, lt)` sent as `date.gte` / `date.lt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub gte: NaiveDate,
    pub lt: NaiveDate,
}

impl DateRange {
    /// The `months` months up to, but excluding, `today`.
    pub fn trailing_months(today: NaiveDate, months: u32) -> Self {
        let gte = today
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        Self { gte, lt: today }
    }
}

/// One datatable row: `[ticker, date, open]`. Quandl reports a missing open
/// as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow(pub String, pub NaiveDate, pub Option<f64>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datatable {
    #[serde(default)]
    pub data: Vec<PriceRow>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub next_cursor_id: Option<String>,
}

/// The datatable response body, also forwarded verbatim to clients as `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    #[serde(default)]
    pub datatable: Datatable,
    #[serde(default)]
    pub meta: Meta,
}

impl PriceTable {
    pub fn is_empty(&self) -> bool {
        self.datatable.data.is_empty()
    }

    /// Rows with a known opening price, in upstream order.
    pub fn points(&self) -> Vec<PricePoint> {
        self.datatable
            .data
            .iter()
            .filter_map(|PriceRow(ticker, date, open)| {
                open.map(|price| PricePoint::new(ticker.clone(), *date, price))
            })
            .collect()
    }
}
