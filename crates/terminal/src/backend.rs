//! Backend seam between the session host and the hosted process.
//!
//! The host only needs an input/resize handle and a stream of process
//! events; tests substitute a channel-backed mock for the real PTY.

use scan_types::TerminalError;
use tokio::sync::mpsc;

/// Event produced by the hosted process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of terminal output.
    Output(Vec<u8>),
    /// The process terminated (exit or crash).
    Exited,
}

/// Input side of a running hosted process.
pub trait TerminalIo: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), TerminalError>;

    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), TerminalError>;
}

/// Spawns hosted processes.
pub trait TerminalBackend: Send + Sync {
    /// Allocate a fresh terminal of the given geometry and start the process.
    ///
    /// Returns the input handle and the event stream; the stream yields
    /// `Output` chunks and ends with a single `Exited`.
    fn spawn(
        &self,
        rows: u16,
        cols: u16,
    ) -> Result<(Box<dyn TerminalIo>, mpsc::UnboundedReceiver<ProcessEvent>), TerminalError>;
}
