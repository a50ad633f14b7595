//! The terminal session host.
//!
//! Owns at most one hosted interactive process and fans its output out to
//! every attached client. Command emission is serialized against the
//! execution gate; raw stdin and resize pass through ungated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use scan_types::{ConnectionId, SessionGateway, TerminalError};

use crate::backend::{ProcessEvent, TerminalBackend, TerminalIo};
use crate::tracker::ExecutionTracker;

/// Control byte written before each emitted command (kill-line, so the
/// command replaces any half-typed input on the process's prompt).
pub const COMMAND_PREFIX: u8 = 0x15;

/// Initial terminal geometry for a freshly spawned process.
pub const INITIAL_ROWS: u16 = 24;
pub const INITIAL_COLS: u16 = 80;

struct TerminalClient {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

enum ProcessSlot {
    Absent,
    Spawning,
    Running(Box<dyn TerminalIo>),
}

pub struct TerminalHost {
    clients: Mutex<Vec<TerminalClient>>,
    process: Mutex<ProcessSlot>,
    spawn_count: AtomicU64,
    tracker: Arc<ExecutionTracker>,
    backend: Arc<dyn TerminalBackend>,
    sessions: Arc<dyn SessionGateway>,
}

impl TerminalHost {
    pub fn new(
        backend: Arc<dyn TerminalBackend>,
        tracker: Arc<ExecutionTracker>,
        sessions: Arc<dyn SessionGateway>,
    ) -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(Vec::new()),
            process: Mutex::new(ProcessSlot::Absent),
            spawn_count: AtomicU64::new(0),
            tracker,
            backend,
            sessions,
        })
    }

    /// Attach a client to the session.
    ///
    /// Verifies the caller, registers transport teardown, and lazily spawns
    /// the hosted process if it is not running.
    pub fn register_client(
        self: &Arc<Self>,
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<(), TerminalError> {
        self.sessions.verify(conn)?;
        self.clients.lock().unwrap().push(TerminalClient { conn, tx });
        info!(%conn, "terminal client connected");

        let host = Arc::downgrade(self);
        self.sessions.set_connection_closed_callback(
            conn,
            Box::new(move |conn| {
                if let Some(host) = host.upgrade() {
                    host.connection_closed(conn);
                }
            }),
        );

        self.ensure_spawned()
    }

    /// Emit a command to the hosted process, waiting for the execution gate.
    ///
    /// The wait holds no registry lock, so clients can attach, detach and
    /// write stdin while a command emission is pending. When multiple
    /// commands are pending, all are released on the idle transition with
    /// unspecified relative order.
    pub async fn emit_command(self: &Arc<Self>, conn: ConnectionId, cmd: &str) -> Result<(), TerminalError> {
        self.sessions.verify(conn)?;
        self.tracker.gate().wait_idle().await;

        let mut input = Vec::with_capacity(cmd.len() + 2);
        input.push(COMMAND_PREFIX);
        input.extend_from_slice(cmd.as_bytes());
        input.push(b'\r');
        self.write_input(&input)
    }

    /// Write raw bytes to the hosted process, bypassing the execution gate.
    pub fn stdin(self: &Arc<Self>, conn: ConnectionId, data: &[u8]) -> Result<(), TerminalError> {
        self.sessions.verify(conn)?;
        self.write_input(data)
    }

    /// Forward a terminal-resize request to the hosted process.
    pub fn resize(self: &Arc<Self>, conn: ConnectionId, rows: u16, cols: u16) -> Result<(), TerminalError> {
        self.sessions.verify(conn)?;
        self.ensure_spawned()?;
        let mut slot = self.process.lock().unwrap();
        match &mut *slot {
            ProcessSlot::Running(io) => io.resize(rows, cols),
            _ => Err(TerminalError::Pty("terminal process not running".into())),
        }
    }

    /// Detach the client registered for `conn`. Idempotent.
    pub fn connection_closed(&self, conn: ConnectionId) {
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain(|client| client.conn != conn);
        if clients.len() != before {
            info!(%conn, "terminal client removed after connection loss");
        } else {
            debug!(%conn, "connection close for unknown terminal client ignored");
        }
    }

    /// Number of times a process has been spawned over the host's lifetime.
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count.load(Ordering::Relaxed)
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.process.lock().unwrap(), ProcessSlot::Running(_))
    }

    fn write_input(self: &Arc<Self>, data: &[u8]) -> Result<(), TerminalError> {
        self.ensure_spawned()?;
        let mut slot = self.process.lock().unwrap();
        match &mut *slot {
            ProcessSlot::Running(io) => io.write(data),
            _ => Err(TerminalError::Pty("terminal process not running".into())),
        }
    }

    /// Spawn the hosted process if the slot is empty.
    ///
    /// The slot passes through `Spawning` so a failed spawn leaves it
    /// `Absent` again rather than wedged.
    fn ensure_spawned(self: &Arc<Self>) -> Result<(), TerminalError> {
        let mut slot = self.process.lock().unwrap();
        if let ProcessSlot::Running(_) = *slot {
            return Ok(());
        }
        *slot = ProcessSlot::Spawning;
        match self.backend.spawn(INITIAL_ROWS, INITIAL_COLS) {
            Ok((io, events)) => {
                *slot = ProcessSlot::Running(io);
                self.spawn_count.fetch_add(1, Ordering::Relaxed);
                let host = Arc::downgrade(self);
                tokio::spawn(pump_events(host, events));
                info!("terminal process spawned, waiting for event emitter to attach");
                Ok(())
            }
            Err(e) => {
                *slot = ProcessSlot::Absent;
                Err(e)
            }
        }
    }

    fn broadcast_output(&self, chunk: Vec<u8>) {
        let senders: Vec<mpsc::UnboundedSender<Vec<u8>>> = {
            let clients = self.clients.lock().unwrap();
            clients.iter().map(|client| client.tx.clone()).collect()
        };
        for tx in senders {
            // Best effort: a lost client is torn down by the transport's
            // connection-closed notification, not here.
            let _ = tx.send(chunk.clone());
        }
    }

    fn on_process_exit(&self) {
        *self.process.lock().unwrap() = ProcessSlot::Absent;
        self.tracker.clear_attachment();
        info!("terminal process exited; a new one will spawn on next use");
    }
}

/// Drains the hosted process's event stream until it terminates.
async fn pump_events(
    host: std::sync::Weak<TerminalHost>,
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(host) = host.upgrade() else { return };
        match event {
            ProcessEvent::Output(chunk) => host.broadcast_output(chunk),
            ProcessEvent::Exited => {
                host.on_process_exit();
                return;
            }
        }
    }
}
