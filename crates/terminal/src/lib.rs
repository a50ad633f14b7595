//! Terminal session host: one hosted interactive process, multiplexed across
//! every attached client, with command delivery gated on the externally
//! reported execution state.

pub mod backend;
pub mod gate;
pub mod host;
pub mod pty;
pub mod tracker;

pub use backend::{ProcessEvent, TerminalBackend, TerminalIo};
pub use gate::ExecutionGate;
pub use host::TerminalHost;
pub use pty::PtyBackend;
pub use tracker::ExecutionTracker;
