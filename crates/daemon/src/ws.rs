//! Public websocket endpoints for data and terminal clients.
//!
//! Each connection presents a session token as a query parameter at the
//! handshake. After registration, a pump task drains the client's outbound
//! channel onto the socket while the handler loop applies inbound ops; any
//! exit path reports the connection closed to the session manager, which
//! drives host-side teardown.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use scan_types::comms::{DataClientOp, TerminalClientOp};
use scan_types::{ConnectionId, RouterError};

use crate::server::AppState;

#[derive(Deserialize)]
pub struct AuthQuery {
    token: String,
}

pub async fn data_ws_handler(
    ws: WebSocketUpgrade,
    Query(auth): Query<AuthQuery>,
    State(state): State<AppState>,
) -> Response {
    let conn = match state.sessions.open(&auth.token) {
        Ok(conn) => conn,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };
    ws.on_upgrade(move |socket| handle_data_socket(socket, conn, state))
}

async fn handle_data_socket(socket: WebSocket, conn: ConnectionId, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Err(e) = state.router.register_remote_client(conn, tx) {
        warn!(%conn, error = %e, "data client registration rejected");
        state.sessions.connection_closed(conn);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<DataClientOp>(&text) {
                        Ok(op) => {
                            if let Err(e) = apply_data_op(&state, conn, op) {
                                warn!(%conn, error = %e, "data client op rejected");
                            }
                        }
                        Err(e) => warn!(%conn, error = %e, "unparseable data client op"),
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    state.sessions.connection_closed(conn);
    info!(%conn, "data client socket closed");
}

fn apply_data_op(state: &AppState, conn: ConnectionId, op: DataClientOp) -> Result<(), RouterError> {
    match op {
        DataClientOp::Subscribe(items) => state.router.subscribe(conn, items),
        DataClientOp::SubscribeAll => state.router.subscribe_all(conn),
        DataClientOp::Unsubscribe(items) => state.router.unsubscribe(conn, &items),
    }
}

pub async fn terminal_ws_handler(
    ws: WebSocketUpgrade,
    Query(auth): Query<AuthQuery>,
    State(state): State<AppState>,
) -> Response {
    let conn = match state.sessions.open(&auth.token) {
        Ok(conn) => conn,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };
    ws.on_upgrade(move |socket| handle_terminal_socket(socket, conn, state))
}

async fn handle_terminal_socket(socket: WebSocket, conn: ConnectionId, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Err(e) = state.terminal.register_client(conn, tx) {
        warn!(%conn, error = %e, "terminal client registration rejected");
        state.sessions.connection_closed(conn);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if ws_tx.send(Message::Binary(chunk)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<TerminalClientOp>(&text) {
                        Ok(op) => {
                            if let Err(e) = apply_terminal_op(&state, conn, op).await {
                                warn!(%conn, error = %e, "terminal client op rejected");
                            }
                        }
                        Err(e) => warn!(%conn, error = %e, "unparseable terminal client op"),
                    }
                }
                // Raw binary frames are treated as stdin.
                Some(Ok(Message::Binary(bytes))) => {
                    if let Err(e) = state.terminal.stdin(conn, &bytes) {
                        warn!(%conn, error = %e, "stdin write failed");
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    state.sessions.connection_closed(conn);
    info!(%conn, "terminal client socket closed");
}

async fn apply_terminal_op(
    state: &AppState,
    conn: ConnectionId,
    op: TerminalClientOp,
) -> Result<(), scan_types::TerminalError> {
    match op {
        // Waits for the execution gate; while this op is pending, output
        // broadcast and other clients' ops proceed unhindered.
        TerminalClientOp::EmitCommand(cmd) => state.terminal.emit_command(conn, &cmd).await,
        TerminalClientOp::Stdin(bytes) => state.terminal.stdin(conn, &bytes),
        TerminalClientOp::Resize { rows, cols } => state.terminal.resize(conn, rows, cols),
    }
}
