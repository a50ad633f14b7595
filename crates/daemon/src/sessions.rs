//! Session manager: token verification and per-connection teardown callbacks.
//!
//! This is the transport-side collaborator both hosts talk to through the
//! [`SessionGateway`] trait. A connection is opened by presenting a token at
//! the websocket handshake; teardown callbacks registered for it fire exactly
//! once, when the transport reports the connection closed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use scan_types::{AuthError, ConnectionClosedCallback, ConnectionId, SessionGateway};

#[derive(Default)]
struct SessionState {
    authorized: HashSet<ConnectionId>,
    close_callbacks: HashMap<ConnectionId, Vec<ConnectionClosedCallback>>,
}

pub struct SessionManager {
    tokens: HashSet<String>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Arc<Self> {
        let tokens: HashSet<String> = tokens.into_iter().collect();
        if tokens.is_empty() {
            warn!("no session tokens configured; all remote clients will be rejected");
        }
        Arc::new(Self {
            tokens,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Verify `token` and open a new connection identity for it.
    pub fn open(&self, token: &str) -> Result<ConnectionId, AuthError> {
        if !self.tokens.contains(token) {
            return Err(AuthError::Unauthorized);
        }
        let conn = ConnectionId::new();
        self.state.lock().unwrap().authorized.insert(conn);
        debug!(%conn, "session opened");
        Ok(conn)
    }

    /// Notify that `conn` is gone; fires its teardown callbacks exactly once.
    ///
    /// A second call for the same connection is a no-op.
    pub fn connection_closed(&self, conn: ConnectionId) {
        let callbacks = {
            let mut state = self.state.lock().unwrap();
            state.authorized.remove(&conn);
            state.close_callbacks.remove(&conn)
        };
        match callbacks {
            Some(callbacks) => {
                info!(%conn, callbacks = callbacks.len(), "connection closed");
                // Fired outside the lock: callbacks re-enter host registries.
                for callback in callbacks {
                    callback(conn);
                }
            }
            None => debug!(%conn, "close for unknown or already-closed connection ignored"),
        }
    }
}

impl SessionGateway for SessionManager {
    fn verify(&self, conn: ConnectionId) -> Result<(), AuthError> {
        if self.state.lock().unwrap().authorized.contains(&conn) {
            Ok(())
        } else {
            Err(AuthError::Unauthorized)
        }
    }

    fn set_connection_closed_callback(
        &self,
        conn: ConnectionId,
        callback: ConnectionClosedCallback,
    ) {
        self.state
            .lock()
            .unwrap()
            .close_callbacks
            .entry(conn)
            .or_default()
            .push(callback);
    }
}
