//! Error types shared across the router and terminal crates.

use thiserror::Error;

/// Failure to deliver a push message to one client.
///
/// This is a per-client, recoverable signal: the broadcaster handles it
/// locally (cleanup of the lost client) and continues with the remaining
/// clients. It is never propagated to the upstream producer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection lost during delivery")]
    ConnectionLost,
}

/// Session-token verification failure, surfaced to the immediate caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("session token rejected")]
    Unauthorized,
}

/// Errors surfaced by the data router's client-facing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("caller is not authorized")]
    Unauthorized,

    #[error("unknown client: {0}")]
    UnknownClient(String),
}

impl From<AuthError> for RouterError {
    fn from(_: AuthError) -> Self {
        RouterError::Unauthorized
    }
}

/// Errors surfaced by the terminal session host.
#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("caller is not authorized")]
    Unauthorized,

    #[error("failed to spawn terminal process: {0}")]
    Spawn(String),

    #[error("terminal pty error: {0}")]
    Pty(String),

    #[error("terminal io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AuthError> for TerminalError {
    fn from(_: AuthError) -> Self {
        TerminalError::Unauthorized
    }
}
