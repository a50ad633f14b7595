//! Client identities and delivery handles.
//!
//! A registered client is either locally hosted (an in-process callback) or
//! remotely connected (a websocket proxied through a per-client channel).
//! The two cases are a tagged variant dispatched by pattern match at
//! delivery time.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::comms::DataClientMessage;
use crate::data::{DataFrame, ScanStatus, StreamDescriptor};
use crate::error::DeliveryError;

/// Identity of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one registered client, local or remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback interface implemented by locally hosted data clients.
pub trait DataClientCallback: Send + Sync {
    fn scan_start(
        &self,
        scan_id: u64,
        descriptors: &[StreamDescriptor],
    ) -> Result<(), DeliveryError>;

    fn data_update(&self, frames: &[DataFrame]) -> Result<(), DeliveryError>;

    fn scan_end(&self, status: &ScanStatus) -> Result<(), DeliveryError>;
}

/// Proxy to a remotely connected data client, fixed to one connection.
///
/// Push messages are queued on the connection's outbound channel; the
/// transport task drains it onto the websocket. A send on a closed channel
/// means the transport task is gone, which is the connection-lost signal.
#[derive(Debug, Clone)]
pub struct RemoteDataClient {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<DataClientMessage>,
}

impl RemoteDataClient {
    pub fn new(conn: ConnectionId, tx: mpsc::UnboundedSender<DataClientMessage>) -> Self {
        Self { conn, tx }
    }

    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    fn push(&self, msg: DataClientMessage) -> Result<(), DeliveryError> {
        self.tx.send(msg).map_err(|_| DeliveryError::ConnectionLost)
    }
}

/// Delivery handle of a registered client.
#[derive(Clone)]
pub enum ClientHandle {
    Local(Arc<dyn DataClientCallback>),
    Remote(RemoteDataClient),
}

impl ClientHandle {
    pub fn scan_start(
        &self,
        scan_id: u64,
        descriptors: Vec<StreamDescriptor>,
    ) -> Result<(), DeliveryError> {
        match self {
            ClientHandle::Local(callback) => callback.scan_start(scan_id, &descriptors),
            ClientHandle::Remote(proxy) => proxy.push(DataClientMessage::ScanStart {
                scan_id,
                descriptors,
            }),
        }
    }

    pub fn data_update(&self, frames: Vec<DataFrame>) -> Result<(), DeliveryError> {
        match self {
            ClientHandle::Local(callback) => callback.data_update(&frames),
            ClientHandle::Remote(proxy) => proxy.push(DataClientMessage::DataUpdate { frames }),
        }
    }

    pub fn scan_end(&self, status: ScanStatus) -> Result<(), DeliveryError> {
        match self {
            ClientHandle::Local(callback) => callback.scan_end(&status),
            ClientHandle::Remote(proxy) => proxy.push(DataClientMessage::ScanEnd { status }),
        }
    }

    /// Connection this handle is fixed to, if it is remote.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            ClientHandle::Local(_) => None,
            ClientHandle::Remote(proxy) => Some(proxy.connection()),
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientHandle::Local(_) => f.write_str("ClientHandle::Local"),
            ClientHandle::Remote(proxy) => write!(f, "ClientHandle::Remote({})", proxy.conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_send_after_receiver_drop_is_connection_lost() {
        let (tx, rx) = mpsc::unbounded_channel();
        let proxy = RemoteDataClient::new(ConnectionId::new(), tx);
        drop(rx);

        let handle = ClientHandle::Remote(proxy);
        assert_eq!(
            handle.scan_end(ScanStatus::Completed),
            Err(DeliveryError::ConnectionLost)
        );
    }

    #[test]
    fn remote_push_queues_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ClientHandle::Remote(RemoteDataClient::new(ConnectionId::new(), tx));

        handle.scan_start(7, Vec::new()).unwrap();
        match rx.try_recv().unwrap() {
            DataClientMessage::ScanStart { scan_id, .. } => assert_eq!(scan_id, 7),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
