// =============================================================================
// WebSocket Handler — Push-based dashboard updates
// =============================================================================
//
// Clients connect to `/ws` and receive:
//   1. An immediate `success` frame with the current dashboard on connect.
//   2. A fresh `success` frame whenever the state version has changed since
//      the last push, checked every `push_interval_ms`.
//
// Client frames (`submit`, `delete`, `hover`) are answered on the same
// socket only when the answer is private (`invalid`, `tooltip`, `error`).
// Successful mutations bump the state version, so every connection,
// including the sender, picks up the new dashboard on its next tick.
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::app_state::{AppState, Dashboard, DeleteOutcome, SubmitOutcome};
use crate::chart::{ChartModel, Tooltip};
use crate::quandl::PriceTable;
use crate::types::StockCode;

// =============================================================================
// Frames
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientEvent {
    Submit { stock: String },
    Delete { stock: String },
    Hover { x: f64, y: f64 },
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ServerEvent<'a> {
    Success {
        version: u64,
        data: &'a PriceTable,
        stocks: &'a [StockCode],
        chart: &'a ChartModel,
        svg: String,
    },
    Invalid {
        stock: String,
        message: String,
    },
    /// `tooltip: null` tells the client to hide it.
    Tooltip {
        tooltip: Option<Tooltip>,
    },
    Error {
        message: String,
    },
}

impl<'a> ServerEvent<'a> {
    pub fn success(dash: &'a Dashboard) -> Self {
        Self::Success {
            version: dash.version,
            data: &dash.data,
            stocks: &dash.stocks,
            chart: &dash.chart,
            svg: dash.chart.to_svg(),
        }
    }
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Manages a single WebSocket connection lifecycle.
///
/// Runs two branches via `tokio::select!`:
///   1. **Push**: on each tick, send the dashboard if the version moved.
///   2. **Recv**: handle client events, Ping/Pong and Close.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let clients = state.connected_clients.fetch_add(1, Ordering::Relaxed) + 1;
    info!(clients, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let mut last_sent_version = match state.dashboard_or_refresh().await {
        Ok(dash) => {
            if let Err(e) = send_event(&mut sender, &state, &ServerEvent::success(&dash)).await {
                warn!(error = %e, "Failed to send initial dashboard");
                cleanup(&state);
                return;
            }
            dash.version
        }
        Err(e) => {
            warn!(error = %e, "No dashboard available for new client");
            state.push_error(format!("initial dashboard failed: {e:#}"));
            let event = ServerEvent::Error {
                message: format!("{e:#}"),
            };
            if send_event(&mut sender, &state, &event).await.is_err() {
                cleanup(&state);
                return;
            }
            0
        }
    };

    let period = Duration::from_millis(state.config.push_interval_ms.max(1));
    let mut push_interval = interval(period);
    push_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // ── Push: check for version changes ─────────────────────────
            _ = push_interval.tick() => {
                if state.current_state_version() == last_sent_version {
                    continue;
                }
                let Some(dash) = state.dashboard() else { continue };
                match send_event(&mut sender, &state, &ServerEvent::success(&dash)).await {
                    Ok(()) => last_sent_version = dash.version,
                    Err(e) => {
                        debug!(error = %e, "WebSocket send failed — disconnecting");
                        break;
                    }
                }
            }

            // ── Recv: process incoming messages ─────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => handle_client_event(&state, event).await,
                            Err(e) => {
                                debug!(error = %e, "Ignoring unparsable WebSocket frame");
                                None
                            }
                        };
                        if let Some(reply) = reply {
                            if let Err(e) = send_event(&mut sender, &state, &reply).await {
                                debug!(error = %e, "WebSocket reply failed — disconnecting");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket Close frame received");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    cleanup(&state);
}

/// Apply one client event. Returns the private reply, if any.
async fn handle_client_event(
    state: &AppState,
    event: ClientEvent,
) -> Option<ServerEvent<'static>> {
    match event {
        ClientEvent::Submit { stock } => match state.submit_stock(&stock).await {
            Ok(SubmitOutcome::Added(_)) => None,
            Ok(SubmitOutcome::Rejected(rejection)) => Some(ServerEvent::Invalid {
                stock: rejection.stock().to_string(),
                message: rejection.message(),
            }),
            Err(e) => Some(error_event(state, "submit", &e)),
        },
        ClientEvent::Delete { stock } => match state.delete_stock(&stock).await {
            Ok(DeleteOutcome::Removed(_)) => None,
            Ok(DeleteOutcome::NotTracked(code)) => Some(ServerEvent::Error {
                message: format!("'{code}' is not being tracked."),
            }),
            Err(e) => Some(error_event(state, "delete", &e)),
        },
        ClientEvent::Hover { x, y } => Some(ServerEvent::Tooltip {
            tooltip: state.tooltip(x, y),
        }),
    }
}

fn error_event(state: &AppState, action: &str, err: &anyhow::Error) -> ServerEvent<'static> {
    warn!(action, error = %err, "WebSocket request failed");
    state.push_error(format!("{action} failed: {err:#}"));
    ServerEvent::Error {
        message: format!("{err:#}"),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Serialize and send one frame. Bumps the global `ws_sequence_number`.
async fn send_event<S>(
    sender: &mut S,
    state: &AppState,
    event: &ServerEvent<'_>,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            // Not a network error; keep the connection.
            warn!(error = %e, "Failed to serialize WebSocket frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(json)).await?;
    let seq = state.ws_sequence_number.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(seq, "WebSocket frame sent");
    Ok(())
}

fn cleanup(state: &AppState) {
    let clients = state.connected_clients.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    info!(clients, "WebSocket client disconnected");
}

// =============================================================================
// Tests
// =============================================================================
