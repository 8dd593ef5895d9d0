//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, Notify};
use tokio::time;

use crate::AppState;

use super::events::{
    parse_tables, ClientMessage, EventName, HeartbeatPayload, IdentifyPayload, RealtimeMessage,
    SubscriptionPayload, OP_HEARTBEAT, OP_IDENTIFY, OP_SUBSCRIBE, OP_UNSUBSCRIBE,
};
use super::fanout::BroadcastPayload;
use super::handler::{handle_identify, HEARTBEAT_INTERVAL_MS};
use super::session::RealtimeSession;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_INVALID_PAYLOAD: u16 = 4002;
const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving IDENTIFY after connection (seconds).
const IDENTIFY_TIMEOUT_SECS: u64 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/realtime", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: Wait for IDENTIFY within timeout.
    let identify = time::timeout(
        Duration::from_secs(IDENTIFY_TIMEOUT_SECS),
        read_identify(&mut ws_rx),
    )
    .await;

    let payload = match identify {
        Ok(Ok(payload)) => payload,
        Ok(Err((code, reason))) => {
            tracing::debug!(%reason, "realtime handshake failed");
            let _ = send_close(&mut ws_tx, code, reason).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    let tables = match parse_tables(&payload.tables) {
        Ok(tables) => tables,
        Err(reason) => {
            let _ = send_close(&mut ws_tx, CLOSE_INVALID_PAYLOAD, &reason).await;
            return;
        }
    };

    // Step 2: Validate the ticket and build READY.
    let (session, ready_msg) = match handle_identify(&state, &payload.ticket, tables).await {
        Ok(result) => result,
        Err(reason) => {
            tracing::debug!(%reason, "identify handler failed");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, reason).await;
            return;
        }
    };

    // Subscribe and register before READY so nothing in between is missed.
    let session = Arc::new(session);
    let broadcast_rx = state.broadcast.subscribe();
    let revoke = state
        .connections
        .register(&session.connection_id, &session.user_id);

    if send_json(&mut ws_tx, &ready_msg).await.is_err() {
        state.connections.unregister(&session.connection_id);
        return;
    }

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        tables = ?session.table_names(),
        "realtime connection established"
    );

    run_session(session.clone(), ws_tx, ws_rx, broadcast_rx, revoke).await;

    state.connections.unregister(&session.connection_id);

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        "realtime connection ended"
    );
}

/// Read frames until the client sends IDENTIFY. Any other opcode is a
/// protocol error.
async fn read_identify(ws_rx: &mut WsStream) -> Result<IdentifyPayload, (u16, &'static str)> {
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(?e, "ws read error during identify");
                return Err((CLOSE_UNKNOWN_ERROR, "read error"));
            }
        };

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => return Err((CLOSE_UNKNOWN_ERROR, "client closed")),
            _ => continue,
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(_) => return Err((CLOSE_UNKNOWN_ERROR, "Invalid JSON")),
        };

        if client_msg.op != OP_IDENTIFY {
            return Err((CLOSE_NOT_AUTHENTICATED, "Expected IDENTIFY"));
        }

        return serde_json::from_value(client_msg.d)
            .map_err(|_| (CLOSE_INVALID_PAYLOAD, "Invalid IDENTIFY payload"));
    }
    Err((CLOSE_UNKNOWN_ERROR, "connection closed before identify"))
}

/// Main connection loop: read client messages, forward broadcasts, enforce
/// heartbeat, and honour revocation.
async fn run_session(
    session: Arc<RealtimeSession>,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut broadcast_rx: broadcast::Receiver<Arc<BroadcastPayload>>,
    revoke: Arc<Notify>,
) {
    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                                break;
                            }
                        };

                        match client_msg.op {
                            OP_HEARTBEAT => {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload =
                                    serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
                                let ack = RealtimeMessage::heartbeat_ack(payload.seq);
                                if send_json(&mut ws_tx, &ack).await.is_err() {
                                    break;
                                }
                            }
                            OP_SUBSCRIBE | OP_UNSUBSCRIBE => {
                                let tables = serde_json::from_value::<SubscriptionPayload>(client_msg.d)
                                    .map_err(|_| "Invalid subscription payload".to_string())
                                    .and_then(|p| parse_tables(&p.tables));
                                let tables = match tables {
                                    Ok(tables) => tables,
                                    Err(reason) => {
                                        let _ = send_close(&mut ws_tx, CLOSE_INVALID_PAYLOAD, &reason).await;
                                        break;
                                    }
                                };

                                if client_msg.op == OP_SUBSCRIBE {
                                    session.subscribe(&tables);
                                } else {
                                    session.unsubscribe(&tables);
                                }

                                let msg = RealtimeMessage::dispatch(
                                    EventName::SUBSCRIPTIONS,
                                    session.next_seq(),
                                    serde_json::json!({ "tables": session.table_names() }),
                                );
                                if send_json(&mut ws_tx, &msg).await.is_err() {
                                    break;
                                }
                            }
                            OP_IDENTIFY => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Already identified").await;
                                break;
                            }
                            _ => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                }
            }

            result = broadcast_rx.recv() => {
                match result {
                    Ok(payload) => {
                        if !session.should_receive(&payload) {
                            continue;
                        }

                        let msg = RealtimeMessage::dispatch(
                            payload.kind.as_str(),
                            session.next_seq(),
                            serde_json::json!({
                                "table": payload.table.as_str(),
                                "record": payload.record,
                            }),
                        );
                        if send_json(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Missed events are dropped; clients re-fetch on the next change.
                        tracing::warn!(
                            connection_id = %session.connection_id,
                            skipped = n,
                            "realtime connection lagged behind broadcast"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = revoke.notified() => {
                let _ = send_json(&mut ws_tx, &RealtimeMessage::reconnect("Session revoked")).await;
                let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, "Session revoked").await;
                break;
            }

            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        "heartbeat timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

async fn send_json(ws_tx: &mut WsSink, msg: &RealtimeMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
