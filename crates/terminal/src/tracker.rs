//! Execution-state tracker, driven by the hosted process's instrumentation
//! over the internal channel.

use std::sync::Mutex;

use tracing::info;

use crate::gate::ExecutionGate;

/// Tracks whether the hosted process is executing a command.
///
/// The attach record is informational only; the gate is correct whether or
/// not an emitter ever attaches.
pub struct ExecutionTracker {
    gate: ExecutionGate,
    attached_port: Mutex<Option<u16>>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self {
            gate: ExecutionGate::new(),
            attached_port: Mutex::new(None),
        }
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Record the port the event emitter attached from.
    pub fn attach(&self, port: u16) {
        *self.attached_port.lock().unwrap() = Some(port);
        info!(port, "terminal event emitter attached");
    }

    pub fn enter_execution(&self, cmd: &str) {
        info!(cmd, "command entered execution");
        self.gate.set_busy();
    }

    pub fn leave_execution(&self, result: &str) {
        info!(result, "command left execution");
        self.gate.set_idle();
    }

    pub fn attached_port(&self) -> Option<u16> {
        *self.attached_port.lock().unwrap()
    }

    /// Forget the attached emitter; called when the hosted process exits.
    pub fn clear_attachment(&self) {
        *self.attached_port.lock().unwrap() = None;
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}
