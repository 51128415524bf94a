// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! The `axum` HTTP/WS surface (§4.6, §4.9): `/ws` upgrade, `/api/health`,
//! and the per-session rx/tx task pair. Wiring mirrors the corpus's own WS
//! bridge (`ws_handler` + `on_upgrade` + a forwarding task), generalized
//! with admission control, command dispatch, and heartbeats the bridge
//! itself does not need.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::channel::TelemetryChannel;
use crate::clock::Clock;
use crate::command::{CommandDispatcher, CommandRequest, CommandResponse, DispatchContext};
use crate::config::SharedConfig;
use crate::connection_manager::{AdmissionError, ConnectionManager};
use crate::error::NeonLinkError;
use crate::session::{ClientSession, SessionState};
use crate::snapshot::{AdminLevel, SCHEMA_VERSION};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on how long the rx loop waits for the tx task to drain its close
/// frame before forcing the connection down.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct AppState {
    pub config: SharedConfig,
    pub manager: Arc<ConnectionManager>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub telemetry: Arc<TelemetryChannel>,
    pub command_slots: Arc<Semaphore>,
    pub started_at_ms: i64,
    pub shutdown: Arc<tokio::sync::Notify>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_sec = ((state.clock.now_ms() - state.started_at_ms).max(0) / 1000) as u64;
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSec": uptime_sec,
        "clients": state.manager.len().await,
        "schemaVersion": SCHEMA_VERSION,
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let config = state.config.load();
    if let Err(reason) = state.manager.admit(remote_addr.ip(), &config).await {
        let reason = match reason {
            AdmissionError::RejectedIp => "rejected_ip",
            AdmissionError::Capacity => "capacity",
        };
        warn!(remote = %remote_addr, reason, "connection refused before upgrade");
        return (axum::http::StatusCode::FORBIDDEN, reason).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, remote_addr, state))
        .into_response()
}

/// Outcome of one text frame, driving whether the rx loop keeps reading.
#[derive(Debug, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    Close,
}

fn close_frame(reason: &str) -> Message {
    let code = if reason == "protocol_error" {
        close_code::PROTOCOL
    } else {
        close_code::NORMAL
    };
    Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Owned(reason.to_string()),
    }))
}

async fn handle_socket(socket: WebSocket, remote_addr: SocketAddr, state: Arc<AppState>) {
    let config = state.config.load();
    let now_ms = state.clock.now_ms();
    let (session, mut outbound_rx) = state
        .manager
        .register(remote_addr, now_ms, config.security.rate_limit_per_minute)
        .await;
    let mut session_state = SessionState::Handshaking;
    let heartbeat_interval_ms = config.server.heartbeat_interval_ms.max(1);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // The tx task both drains the outbound slot and originates a keepalive
    // ping of its own whenever that slot has sat empty for a heartbeat
    // interval (§4.6), and carries out the actual WS close handshake once
    // the session's close signal fires, whatever triggered it.
    let tx_session = session.clone();
    let tx_clock = state.clock.clone();
    let tx_close_signal = session.close_signal();
    let mut tx_task = tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(Duration::from_millis(heartbeat_interval_ms));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = tx_close_signal.notified() => break,
                frame = outbound_rx.next_frame() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                    tx_session.touch_tx(tx_clock.now_ms());
                    keepalive.reset();
                }
                _ = keepalive.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                    tx_session.touch_tx(tx_clock.now_ms());
                }
            }
        }

        let reason = tx_session.close_reason().unwrap_or_else(|| "server_closed".to_string());
        let _ = ws_tx.send(close_frame(&reason)).await;
        let _ = ws_tx.close().await;
    });

    let handshake_deadline = tokio::time::sleep(HANDSHAKE_TIMEOUT);
    tokio::pin!(handshake_deadline);
    let mut handshaken = false;

    let close_signal = session.close_signal();
    let mut heartbeat_ticker = tokio::time::interval(Duration::from_millis(heartbeat_interval_ms));
    heartbeat_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat_ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = close_signal.notified() => {
                session_state = SessionState::Closing;
                break;
            }
            _ = &mut handshake_deadline, if !handshaken => {
                debug!(session_id = %session.id, "handshake deadline elapsed without activity");
                session_state = SessionState::Closing;
                session.request_close("handshake_timeout");
                break;
            }
            _ = heartbeat_ticker.tick() => {
                if session.is_idle_past(state.clock.now_ms(), config.server.ping_timeout_ms) {
                    debug!(session_id = %session.id, "session timed out");
                    session_state = SessionState::Closing;
                    session.request_close("idle_timeout");
                    break;
                }
            }
            maybe_msg = ws_rx.next() => {
                let Some(msg) = maybe_msg else { break };
                handshaken = true;
                match msg {
                    Ok(Message::Text(text)) => {
                        if handle_text_frame(&text, &session, &state).await == FrameOutcome::Close {
                            session_state = SessionState::Closing;
                            session.request_close("protocol_error");
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        session_state = SessionState::Closing;
                        session.request_close("client_closed");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                        session.touch_rx(state.clock.now_ms());
                    }
                    Ok(Message::Binary(_)) => {
                        warn!(session_id = %session.id, "binary frames unsupported");
                    }
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "websocket error, closing session");
                        session_state = SessionState::Closing;
                        session.request_close("websocket_error");
                        break;
                    }
                }
            }
            _ = state.shutdown.notified() => {
                session_state = SessionState::Closing;
                session.request_close("server_shutdown");
                break;
            }
        }
    }

    session_state = SessionState::Closed;
    debug!(session_id = %session.id, ?session_state, "session loop exited");
    // Idempotent: covers the case the loop broke out without ever calling
    // request_close itself (a clean client-initiated socket EOF).
    session.request_close("session_ended");
    if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, &mut tx_task).await.is_err() {
        tx_task.abort();
    }
    state.manager.remove(session.id).await;
}

/// Parse one command frame and, if well-formed, hand it to a spawned task
/// bounded by `command_slots` (§5) so a slow handler cannot stall this rx
/// loop from reading the next frame or observing a shutdown/idle signal.
/// Rate limiting (invariant 4) and the whitelist/admin check still run
/// before a handler is ever considered. A malformed frame is a protocol
/// error: it gets a best-effort JSON error frame and ends the session
/// (§4.6, §7) rather than leaving the connection open in an unknown state.
async fn handle_text_frame(text: &str, session: &Arc<ClientSession>, state: &Arc<AppState>) -> FrameOutcome {
    session.touch_rx(state.clock.now_ms());

    let request: CommandRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            let response = CommandResponse::err(
                "unknown",
                None,
                NeonLinkError::ProtocolError(e.to_string()).as_wire_code(),
                state.clock.now_ms(),
            );
            send_response(session, response);
            return FrameOutcome::Close;
        }
    };

    if !session.token_bucket.try_consume(std::time::Instant::now()) {
        let response = CommandResponse::err(&request.command, request.id, "rate_limited", state.clock.now_ms());
        send_response(session, response);
        return FrameOutcome::Continue;
    }

    let admin_level = state
        .telemetry
        .current()
        .map(|snap| snap.admin_level)
        .unwrap_or(AdminLevel::None);

    let state = state.clone();
    let session = session.clone();
    tokio::spawn(async move {
        let _permit = match state.command_slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let dispatcher = state.dispatcher.clone();
        let telemetry = state.telemetry.clone();
        let clock = state.clock.clone();
        let command_name = request.command.clone();
        let request_id = request.id.clone();

        let outcome = tokio::time::timeout(COMMAND_TIMEOUT, async move {
            dispatcher
                .dispatch(
                    request,
                    DispatchContext {
                        admin_level,
                        telemetry: telemetry.as_ref(),
                        clock: clock.as_ref(),
                    },
                )
                .await
        })
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(_) => CommandResponse::err(&command_name, request_id, "timeout", state.clock.now_ms()),
        };
        send_response(&session, response);
    });

    FrameOutcome::Continue
}

fn send_response(session: &Arc<ClientSession>, response: CommandResponse) {
    match serde_json::to_string(&response) {
        Ok(frame) => session.send_frame(frame),
        Err(e) => warn!(session_id = %session.id, error = %e, "failed to encode command response"),
    }
}
