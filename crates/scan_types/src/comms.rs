//! Wire protocol for the websocket endpoints.
//!
//! All messages are JSON. Push messages flow server -> client
//! ([`DataClientMessage`], terminal output is raw binary frames); op messages
//! flow client -> server ([`DataClientOp`], [`TerminalClientOp`]). The two
//! internal-only channels carry [`ScanIngestMessage`] from the upstream
//! producer and [`TerminalEventMessage`] from the hosted process's
//! instrumentation.

use serde::{Deserialize, Serialize};

use crate::data::{DataFrame, ScanStatus, StreamDescriptor};

/// Push message delivered to a remote data client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataClientMessage {
    ScanStart {
        scan_id: u64,
        descriptors: Vec<StreamDescriptor>,
    },
    DataUpdate {
        frames: Vec<DataFrame>,
    },
    ScanEnd {
        status: ScanStatus,
    },
}

/// Subscription operation sent by a remote data client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataClientOp {
    Subscribe(Vec<String>),
    SubscribeAll,
    Unsubscribe(Vec<String>),
}

/// Operation sent by a remote terminal client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminalClientOp {
    EmitCommand(String),
    Stdin(Vec<u8>),
    Resize { rows: u16, cols: u16 },
}

/// Scan lifecycle message from the upstream producer (internal channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanIngestMessage {
    ScanStart {
        scan_id: u64,
        descriptors: Vec<StreamDescriptor>,
    },
    Data {
        frames: Vec<DataFrame>,
    },
    ScanEnd {
        status: ScanStatus,
    },
}

/// Execution-state message from the hosted process's instrumentation
/// (internal channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminalEventMessage {
    Attach { port: u16 },
    EnterExecution { cmd: String },
    LeaveExecution { result: String },
}
