// Test double for the datatable API, served by axum on an ephemeral port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use parking_lot::Mutex;

use super::{Column, Datatable, Meta, PriceRow, PriceTable};
use crate::runtime_config::QuandlSettings;

pub const FAKE_API_KEY: &str = "test-key";

const OUTAGE_PAGE: &str = "<html><body><h1>503 Service Temporarily Unavailable</h1></body></html>";

struct Shared {
    rows: Vec<PriceRow>,
    page_size: Option<usize>,
    failing: bool,
    fail_after: Option<usize>,
    outage_page: bool,
    hits: AtomicUsize,
    last_query: Mutex<Option<HashMap<String, String>>>,
}

pub struct FakeQuandl {
    rows: Vec<PriceRow>,
    page_size: Option<usize>,
    failing: bool,
    fail_after: Option<usize>,
    outage_page: bool,
}

impl FakeQuandl {
    /// Four February 2018 sessions each for AAPL, MSFT and GOOG.
    pub fn with_sample_data() -> Self {
        let days = [1, 2, 5, 6];
        let mut rows = Vec::new();
        for (ticker, base) in [("AAPL", 167.0), ("MSFT", 94.0), ("GOOG", 1100.0)] {
            for (i, day) in days.iter().enumerate() {
                rows.push(PriceRow(
                    ticker.to_string(),
                    NaiveDate::from_ymd_opt(2018, 2, *day).unwrap(),
                    Some(base + i as f64),
                ));
            }
        }
        Self {
            rows,
            page_size: None,
            failing: false,
            fail_after: None,
            outage_page: false,
        }
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Answer every request with a rate-limit error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Serve the first `requests` requests normally, then fail like
    /// [`FakeQuandl::failing`].
    pub fn fail_after(mut self, requests: usize) -> Self {
        self.fail_after = Some(requests);
        self
    }

    /// Answer every request with a 503 HTML page instead of JSON.
    pub fn outage_page(mut self) -> Self {
        self.outage_page = true;
        self
    }

    pub async fn spawn(self) -> RunningFake {
        let shared = Arc::new(Shared {
            rows: self.rows,
            page_size: self.page_size,
            failing: self.failing,
            fail_after: self.fail_after,
            outage_page: self.outage_page,
            hits: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        });

        let app = Router::new()
            .route("/api/v3/datatables/WIKI/PRICES.json", get(prices))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        RunningFake { addr, shared }
    }
}

pub struct RunningFake {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl RunningFake {
    pub fn settings(&self) -> QuandlSettings {
        QuandlSettings {
            base_url: format!("http://{}/api/v3", self.addr),
            api_key: FAKE_API_KEY.to_string(),
            ..QuandlSettings::default()
        }
    }

    pub fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<HashMap<String, String>> {
        self.shared.last_query.lock().clone()
    }
}

async fn prices(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let seen = shared.hits.fetch_add(1, Ordering::SeqCst);
    *shared.last_query.lock() = Some(query.clone());

    if shared.outage_page {
        return (StatusCode::SERVICE_UNAVAILABLE, Html(OUTAGE_PAGE)).into_response();
    }
    if shared.failing || shared.fail_after.is_some_and(|n| seen >= n) {
        let body = serde_json::json!({
            "quandl_error": {
                "code": "QEPx04",
                "message": "You have exceeded the API speed limit of 20 calls per 10 minutes."
            }
        });
        return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    }

    let tickers: Vec<&str> = query
        .get("ticker")
        .map(|t| t.split(',').collect())
        .unwrap_or_default();
    let matching: Vec<PriceRow> = shared
        .rows
        .iter()
        .filter(|row| tickers.contains(&row.0.as_str()))
        .cloned()
        .collect();

    let offset: usize = query
        .get("qopts.cursor_id")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let size = shared.page_size.unwrap_or(matching.len().max(1));
    let end = (offset + size).min(matching.len());
    let page = matching.get(offset..end).map(<[PriceRow]>::to_vec).unwrap_or_default();
    let next_cursor_id = (end < matching.len()).then(|| end.to_string());

    let table = PriceTable {
        datatable: Datatable {
            data: page,
            columns: vec![
                column("ticker", "String"),
                column("date", "Date"),
                column("open", "BigDecimal(34,12)"),
            ],
        },
        meta: Meta { next_cursor_id },
    };
    Json(table).into_response()
}

fn column(name: &str, kind: &str) -> Column {
    Column {
        name: name.to_string(),
        kind: kind.to_string(),
    }
}
