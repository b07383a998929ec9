// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// JSON endpoints under `/api/`, the browser client at `/` and the WebSocket
// at `/ws`. Errors are `{ "error": "..." }` bodies: upstream failures map to
// 502, anything local (the watch-list store) to 500.
//
// CORS is configured permissively; the dashboard is meant to be embeddable.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::{AppState, DeleteOutcome, Rejection, SubmitOutcome, UpstreamUnavailable};

/// The browser client, compiled into the binary.
const INDEX_HTML: &str = include_str!("../../assets/index.html");

// =============================================================================
// Router construction
// =============================================================================

/// Build the full router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/stocks", get(list_stocks).post(add_stock))
        .route("/api/stocks/:code", delete(remove_stock))
        .route("/api/chart", get(chart))
        .route("/api/chart.svg", get(chart_svg))
        .route("/api/tooltip", get(tooltip))
        .route("/ws", get(crate::api::ws::ws_handler))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn failure(state: &AppState, action: &str, err: anyhow::Error) -> Response {
    let status = if err.downcast_ref::<UpstreamUnavailable>().is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!(action, %status, error = %err, "request failed");
    state.push_error(format!("{action} failed: {err:#}"));
    error_response(status, format!("{err:#}"))
}

/// Malformed request bodies and query strings get the same JSON error shape
/// as every other failure, with axum's status code.
fn rejection_response(status: StatusCode, text: String) -> Response {
    warn!(%status, error = %text, "request rejected");
    error_response(status, text)
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

// =============================================================================
// Page + health
// =============================================================================

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_health())
}

// =============================================================================
// Watch-list
// =============================================================================

async fn list_stocks(State(state): State<Arc<AppState>>) -> Response {
    match state.dashboard_or_refresh().await {
        Ok(dash) => Json(dash.payload()).into_response(),
        Err(e) => failure(&state, "list stocks", e),
    }
}

#[derive(Debug, Deserialize)]
struct AddStockRequest {
    stock: String,
}

async fn add_stock(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AddStockRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(rejection.status(), rejection.body_text()),
    };
    match state.submit_stock(&req.stock).await {
        Ok(SubmitOutcome::Added(code)) => {
            info!(stock = %code, "stock added via REST");
            match state.dashboard() {
                Some(dash) => (StatusCode::CREATED, Json(dash.payload())).into_response(),
                None => (StatusCode::CREATED, Json(json!({ "stock": code }))).into_response(),
            }
        }
        Ok(SubmitOutcome::Rejected(rejection)) => {
            let status = match rejection {
                Rejection::AlreadyTracked(_) => StatusCode::CONFLICT,
                Rejection::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            };
            error_response(status, rejection.message())
        }
        Err(e) => failure(&state, "add stock", e),
    }
}

async fn remove_stock(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.delete_stock(&code).await {
        Ok(DeleteOutcome::Removed(code)) => {
            info!(stock = %code, "stock removed via REST");
            match state.dashboard() {
                Some(dash) => Json(dash.payload()).into_response(),
                None => Json(json!({ "stock": code })).into_response(),
            }
        }
        Ok(DeleteOutcome::NotTracked(code)) => error_response(
            StatusCode::NOT_FOUND,
            format!("'{code}' is not being tracked."),
        ),
        Err(e) => failure(&state, "remove stock", e),
    }
}

// =============================================================================
// Chart
// =============================================================================

async fn chart(State(state): State<Arc<AppState>>) -> Response {
    match state.chart_model().await {
        Ok(model) => Json(model).into_response(),
        Err(e) => failure(&state, "chart", e),
    }
}

async fn chart_svg(State(state): State<Arc<AppState>>) -> Response {
    match state.dashboard_or_refresh().await {
        Ok(dash) => {
            ([(header::CONTENT_TYPE, "image/svg+xml")], dash.chart.to_svg()).into_response()
        }
        Err(e) => failure(&state, "chart svg", e),
    }
}

#[derive(Debug, Deserialize)]
struct TooltipQuery {
    x: f64,
    y: f64,
}

async fn tooltip(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TooltipQuery>, QueryRejection>,
) -> Response {
    let q = match query {
        Ok(Query(q)) => q,
        Err(rejection) => return rejection_response(rejection.status(), rejection.body_text()),
    };
    match state.tooltip(q.x, q.y) {
        Some(tip) => Json(tip).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no price data to show"),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::app_state::tests::test_state;
    use crate::quandl::fake::FakeQuandl;

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn post_stock(state: &Arc<AppState>, body: Value) -> (StatusCode, Vec<u8>) {
        send(router(state.clone()), Method::POST, "/api/stocks", Some(body)).await
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn get_stocks_returns_data_and_stocks() {
        let (state, _fake) = test_state(FakeQuandl::with_sample_data(), &["AAPL", "MSFT"]).await;
        let (status, body) = send(router(state), Method::GET, "/api/stocks", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["stocks"], json!(["AAPL", "MSFT"]));
        assert_eq!(body["data"]["datatable"]["data"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn post_stock_outcomes() {
        let (state, _fake) = test_state(FakeQuandl::with_sample_data(), &["AAPL"]).await;

        let (status, body) = post_stock(&state, json!({ "stock": "goog" })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_body(&body)["stocks"], json!(["AAPL", "GOOG"]));

        let (status, body) = post_stock(&state, json!({ "stock": "AAPL" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json_body(&body)["error"], "'AAPL' is already shown.");

        let (status, body) = post_stock(&state, json!({ "stock": "zzz" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(&body)["error"], "'ZZZ' is not a valid stock code.");
    }

    #[tokio::test]
    async fn malformed_post_body_gets_json_error() {
        let (state, fake) = test_state(FakeQuandl::with_sample_data(), &[]).await;
        let (status, body) = post_stock(&state, json!({ "ticker": "GOOG" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let error = json_body(&body)["error"].as_str().unwrap().to_string();
        assert!(error.contains("stock"), "{error}");
        assert_eq!(fake.hits(), 0);
    }

    #[tokio::test]
    async fn non_numeric_tooltip_query_gets_json_error() {
        let (state, _fake) = test_state(FakeQuandl::with_sample_data(), &["AAPL"]).await;
        let (status, body) =
            send(router(state), Method::GET, "/api/tooltip?x=abc&y=1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_body(&body)["error"].is_string());
    }

    #[tokio::test]
    async fn refresh_failure_after_insert_keeps_the_stock() {
        // The first request validates the code, everything after it fails.
        let fake = FakeQuandl::with_sample_data().fail_after(1);
        let (state, _fake) = test_state(fake, &[]).await;

        let (status, body) = post_stock(&state, json!({ "stock": "MSFT" })).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json_body(&body)["error"].as_str().unwrap().contains("QEPx04"));

        let stocks: Vec<String> = state
            .store
            .stocks()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(stocks, vec!["MSFT"]);
        assert!(state.dashboard().is_none());
        assert!(!state.recent_errors.read().is_empty());
    }

    #[tokio::test]
    async fn delete_stock_outcomes() {
        let (state, _fake) = test_state(FakeQuandl::with_sample_data(), &["AAPL", "MSFT"]).await;

        let (status, body) =
            send(router(state.clone()), Method::DELETE, "/api/stocks/aapl", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["stocks"], json!(["MSFT"]));

        let (status, body) = send(router(state), Method::DELETE, "/api/stocks/AAPL", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body)["error"], "'AAPL' is not being tracked.");
    }

    #[tokio::test]
    async fn refresh_failure_after_delete_keeps_the_removal() {
        let fake = FakeQuandl::with_sample_data().fail_after(0);
        let (state, _fake) = test_state(fake, &["AAPL", "MSFT"]).await;

        let (status, _) =
            send(router(state.clone()), Method::DELETE, "/api/stocks/AAPL", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!state.store.contains(&"AAPL".parse().unwrap()).unwrap());
        assert!(state.store.contains(&"MSFT".parse().unwrap()).unwrap());
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let (state, _fake) = test_state(FakeQuandl::with_sample_data().failing(), &["AAPL"]).await;
        let (status, body) = send(router(state.clone()), Method::GET, "/api/stocks", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json_body(&body)["error"].as_str().unwrap().contains("QEPx04"));
        assert_eq!(state.recent_errors.read().len(), 1);
    }

    #[tokio::test]
    async fn chart_endpoints() {
        let (state, _fake) = test_state(FakeQuandl::with_sample_data(), &["AAPL"]).await;

        let (status, _) =
            send(router(state.clone()), Method::GET, "/api/tooltip?x=10&y=10", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(router(state.clone()), Method::GET, "/api/chart", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["lines"].as_array().unwrap().len(), 1);

        let resp = router(state.clone())
            .oneshot(Request::builder().uri("/api/chart.svg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");
        let svg = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&svg).starts_with("<svg"));

        let (status, body) = send(router(state), Method::GET, "/api/tooltip?x=0&y=0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["entries"][0]["ticker"], "AAPL");
    }

    #[tokio::test]
    async fn health_and_fallback() {
        let (state, _fake) = test_state(FakeQuandl::with_sample_data(), &[]).await;

        let (status, body) = send(router(state.clone()), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["state_version"], 0);

        let (status, body) = send(router(state.clone()), Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body), json!({ "error": "Not Found" }));

        let (status, body) = send(router(state), Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&body).contains("<html"));
    }
}
