//! Real hosted-process backend on top of a pseudo-terminal.

use std::io::{Read, Write};

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use scan_types::TerminalError;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::backend::{ProcessEvent, TerminalBackend, TerminalIo};

const READ_BUF_SIZE: usize = 4096;

fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Spawns the configured interactive command on a fresh PTY.
pub struct PtyBackend {
    command: Vec<String>,
}

impl PtyBackend {
    /// `command` is the program followed by its arguments; it must be
    /// non-empty.
    pub fn new(command: Vec<String>) -> Self {
        assert!(!command.is_empty(), "terminal command must not be empty");
        Self { command }
    }
}

impl TerminalBackend for PtyBackend {
    fn spawn(
        &self,
        rows: u16,
        cols: u16,
    ) -> Result<(Box<dyn TerminalIo>, mpsc::UnboundedReceiver<ProcessEvent>), TerminalError> {
        let pty_system = native_pty_system();
        let portable_pty::PtyPair { master, slave } = pty_system
            .openpty(pty_size(rows, cols))
            .map_err(|e| TerminalError::Spawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        let mut child = slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::Spawn(e.to_string()))?;
        // The slave end lives in the child now.
        drop(slave);

        let mut reader = master
            .try_clone_reader()
            .map_err(|e| TerminalError::Spawn(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| TerminalError::Spawn(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Blocking PTY reader. Ends when the PTY closes or the host drops
        // the event receiver.
        let output_tx = event_tx.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; READ_BUF_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if output_tx.send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("pty reader thread finished");
        });

        // Blocking child waiter; signals termination exactly once.
        std::thread::spawn(move || {
            match child.wait() {
                Ok(status) => debug!(?status, "terminal process exited"),
                Err(e) => error!(error = %e, "error waiting for terminal process"),
            }
            let _ = event_tx.send(ProcessEvent::Exited);
        });

        Ok((Box::new(PtyIo { master, writer }), event_rx))
    }
}

struct PtyIo {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
}

impl TerminalIo for PtyIo {
    fn write(&mut self, data: &[u8]) -> Result<(), TerminalError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), TerminalError> {
        self.master
            .resize(pty_size(rows, cols))
            .map_err(|e| TerminalError::Pty(e.to_string()))
    }
}
