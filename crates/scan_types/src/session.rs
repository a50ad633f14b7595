//! Session collaborator seam.
//!
//! Token policy and connection lifetime tracking live outside this core; the
//! router and terminal host only need to verify a caller and to register a
//! per-connection teardown callback at registration time. The transport
//! layer invokes the callback exactly once when the connection is lost.

use crate::client::ConnectionId;
use crate::error::AuthError;

/// Callback fired when a connection is closed or lost.
pub type ConnectionClosedCallback = Box<dyn Fn(ConnectionId) + Send + Sync>;

pub trait SessionGateway: Send + Sync {
    /// Check that the given connection belongs to a verified session.
    fn verify(&self, conn: ConnectionId) -> Result<(), AuthError>;

    /// Register a teardown callback for the given connection.
    fn set_connection_closed_callback(&self, conn: ConnectionId, callback: ConnectionClosedCallback);
}
