// =============================================================================
// Per-stock series — divide the flat upstream row list into one line per stock
// =============================================================================

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{PricePoint, StockCode};

/// The price line of a single ticker, sorted by date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub ticker: String,
    pub points: Vec<PricePoint>,
}

impl Series {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

/// Split `rows` into one series per stock.
///
/// Series follow the order of `stocks`; rows for tickers outside the
/// watch-list are ignored and stocks without any rows produce no series.
/// Each series is sorted by date so that nearest-point lookups can bisect.
pub fn split_by_stock(rows: &[PricePoint], stocks: &[StockCode]) -> Vec<Series> {
    let mut grouped: HashMap<&str, Vec<PricePoint>> = HashMap::with_capacity(stocks.len());
    for row in rows {
        grouped.entry(row.ticker.as_str()).or_default().push(row.clone());
    }

    stocks
        .iter()
        .filter_map(|stock| {
            let mut points = grouped.remove(stock.as_str())?;
            points.sort_by_key(|p| p.date);
            Some(Series {
                ticker: stock.to_string(),
                points,
            })
        })
        .collect()
}

/// Highest price across all series.
pub fn max_price(series: &[Series]) -> Option<f64> {
    series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.price))
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |m| m.max(p))))
}

/// Earliest and latest date across all series.
pub fn date_extent(series: &[Series]) -> Option<(NaiveDate, NaiveDate)> {
    let first = series.iter().filter_map(Series::first_date).min()?;
    let last = series.iter().filter_map(Series::last_date).max()?;
    Some((first, last))
}
