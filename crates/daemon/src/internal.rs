//! Internal-only websocket endpoints.
//!
//! These are served on the loopback listener and are trusted: the scan
//! producer feeds the router's ingestion surface, and the hosted process's
//! instrumentation drives the execution-state tracker. Neither carries a
//! session token.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::{info, warn};

use scan_types::comms::{ScanIngestMessage, TerminalEventMessage};

use crate::server::AppState;

pub async fn scan_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_scan_socket(socket, state))
}

async fn handle_scan_socket(mut socket: WebSocket, state: AppState) {
    info!("scan producer attached");
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ScanIngestMessage>(&text) {
                Ok(ScanIngestMessage::ScanStart {
                    scan_id,
                    descriptors,
                }) => state.router.scan_start(scan_id, descriptors),
                Ok(ScanIngestMessage::Data { frames }) => state.router.push_data(frames),
                Ok(ScanIngestMessage::ScanEnd { status }) => state.router.scan_end(status),
                Err(e) => warn!(error = %e, "unparseable scan ingest message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    info!("scan producer detached");
}

pub async fn terminal_events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_terminal_events_socket(socket, state))
}

async fn handle_terminal_events_socket(mut socket: WebSocket, state: AppState) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<TerminalEventMessage>(&text) {
                Ok(TerminalEventMessage::Attach { port }) => state.tracker.attach(port),
                Ok(TerminalEventMessage::EnterExecution { cmd }) => {
                    state.tracker.enter_execution(&cmd)
                }
                Ok(TerminalEventMessage::LeaveExecution { result }) => {
                    state.tracker.leave_execution(&result)
                }
                Err(e) => warn!(error = %e, "unparseable terminal event"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
}
