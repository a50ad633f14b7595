//! The data router: client registry, subscriptions and scan fan-out.
//!
//! One trusted upstream producer feeds scan lifecycle calls into the router;
//! every registered client (local callback or remote connection) receives the
//! subset of descriptors and frames its subscription matches. Registry
//! mutation and broadcast run against one mutex; broadcasts snapshot the
//! registry under the lock and deliver after release, so a delivery failure
//! can re-enter the cleanup path without deadlocking.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use scan_types::comms::DataClientMessage;
use scan_types::data::{RESERVED_PREFIX, WILDCARD};
use scan_types::{
    ClientHandle, ClientId, ConnectionId, DataClientCallback, DataFrame, DeliveryError,
    RemoteDataClient, RouterError, ScanStatus, SessionGateway, StreamDescriptor,
};

use crate::chain::ProcessorChain;

struct RegisteredClient {
    id: ClientId,
    handle: ClientHandle,
}

#[derive(Default)]
struct RouterState {
    clients: Vec<RegisteredClient>,
    local_names: HashMap<String, ClientId>,
    conn_to_client: HashMap<ConnectionId, ClientId>,
    subscriptions: HashMap<ClientId, HashSet<String>>,
    known_keys: HashMap<String, StreamDescriptor>,
    scan_id: u64,
}

/// Stream name `name` is delivered under subscription `subs` iff it is an
/// exact member, or the wildcard is subscribed and the name is not reserved.
fn matches_subscription(subs: &HashSet<String>, name: &str) -> bool {
    subs.contains(name) || (subs.contains(WILDCARD) && !name.starts_with(RESERVED_PREFIX))
}

pub struct DataRouter {
    state: Mutex<RouterState>,
    chain: ProcessorChain,
    sessions: Arc<dyn SessionGateway>,
}

impl DataRouter {
    pub fn new(sessions: Arc<dyn SessionGateway>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RouterState::default()),
            chain: ProcessorChain::new(),
            sessions,
        })
    }

    // ----------------------
    //   Client registration
    // ----------------------

    /// Register a remote client fixed to `conn`, keyed by that connection.
    ///
    /// The caller's session is verified first; on rejection no state is
    /// mutated. A connection-closed callback is registered with the session
    /// gateway so transport-level loss tears the client down.
    pub fn register_remote_client(
        self: &Arc<Self>,
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<DataClientMessage>,
    ) -> Result<ClientId, RouterError> {
        self.sessions.verify(conn)?;

        let id = ClientId::new();
        let handle = ClientHandle::Remote(RemoteDataClient::new(conn, tx));
        {
            let mut state = self.state.lock().unwrap();
            state.clients.push(RegisteredClient { id, handle });
            state.conn_to_client.insert(conn, id);
            state.subscriptions.insert(id, HashSet::new());
        }
        info!(client = %id, %conn, "remote data client registered");

        let router = Arc::downgrade(self);
        self.sessions.set_connection_closed_callback(
            conn,
            Box::new(move |conn| {
                if let Some(router) = router.upgrade() {
                    router.connection_closed(conn);
                }
            }),
        );
        Ok(id)
    }

    /// Register a trusted in-process client keyed by a logical name.
    ///
    /// Re-registering a name replaces the previous client under that name.
    pub fn register_local_client(
        &self,
        name: &str,
        callback: Arc<dyn DataClientCallback>,
    ) -> ClientId {
        let id = ClientId::new();
        let mut state = self.state.lock().unwrap();
        if let Some(old) = state.local_names.remove(name) {
            remove_client_locked(&mut state, old);
        }
        state.clients.push(RegisteredClient {
            id,
            handle: ClientHandle::Local(callback),
        });
        state.local_names.insert(name.to_owned(), id);
        state.subscriptions.insert(id, HashSet::new());
        info!(client = %id, name, "local data client registered");
        id
    }

    // ----------------------
    //   Subscriptions
    // ----------------------

    /// Replace the calling connection's subscription set.
    pub fn subscribe(&self, conn: ConnectionId, items: Vec<String>) -> Result<(), RouterError> {
        self.sessions.verify(conn)?;
        self.replace_subscription(self.client_for_conn(conn)?, items.into_iter().collect())
    }

    /// Subscribe the calling connection to every non-reserved stream.
    pub fn subscribe_all(&self, conn: ConnectionId) -> Result<(), RouterError> {
        self.sessions.verify(conn)?;
        self.replace_subscription(
            self.client_for_conn(conn)?,
            HashSet::from([WILDCARD.to_owned()]),
        )
    }

    /// Remove items from the calling connection's subscription set.
    ///
    /// Absent items, and an unknown connection, are no-ops.
    pub fn unsubscribe(&self, conn: ConnectionId, items: &[String]) -> Result<(), RouterError> {
        self.sessions.verify(conn)?;
        let mut state = self.state.lock().unwrap();
        if let Some(&id) = state.conn_to_client.get(&conn) {
            if let Some(subs) = state.subscriptions.get_mut(&id) {
                for item in items {
                    subs.remove(item);
                }
            }
        }
        Ok(())
    }

    /// Replace a local client's subscription set.
    pub fn local_subscribe(&self, name: &str, items: Vec<String>) -> Result<(), RouterError> {
        self.replace_subscription(self.client_for_name(name)?, items.into_iter().collect())
    }

    /// Subscribe a local client to every non-reserved stream.
    pub fn local_subscribe_all(&self, name: &str) -> Result<(), RouterError> {
        self.replace_subscription(self.client_for_name(name)?, HashSet::from([WILDCARD.to_owned()]))
    }

    /// Remove items from a local client's subscription set; absent items and
    /// an unknown name are no-ops.
    pub fn local_unsubscribe(&self, name: &str, items: &[String]) {
        let mut state = self.state.lock().unwrap();
        if let Some(&id) = state.local_names.get(name) {
            if let Some(subs) = state.subscriptions.get_mut(&id) {
                for item in items {
                    subs.remove(item);
                }
            }
        }
    }

    fn client_for_conn(&self, conn: ConnectionId) -> Result<ClientId, RouterError> {
        self.state
            .lock()
            .unwrap()
            .conn_to_client
            .get(&conn)
            .copied()
            .ok_or_else(|| RouterError::UnknownClient(conn.to_string()))
    }

    fn client_for_name(&self, name: &str) -> Result<ClientId, RouterError> {
        self.state
            .lock()
            .unwrap()
            .local_names
            .get(name)
            .copied()
            .ok_or_else(|| RouterError::UnknownClient(name.to_owned()))
    }

    fn replace_subscription(
        &self,
        id: ClientId,
        items: HashSet<String>,
    ) -> Result<(), RouterError> {
        let mut state = self.state.lock().unwrap();
        match state.subscriptions.get_mut(&id) {
            Some(subs) => {
                *subs = items;
                Ok(())
            }
            None => Err(RouterError::UnknownClient(id.to_string())),
        }
    }

    // ----------------------
    //   Processing chain
    // ----------------------

    pub fn append_processor(&self, processor: Arc<dyn scan_types::DataProcessor>) {
        self.chain.append(processor);
    }

    pub fn remove_processor(&self, processor: &Arc<dyn scan_types::DataProcessor>) -> bool {
        self.chain.remove(processor)
    }

    pub fn clear_processors(&self) {
        self.chain.clear();
    }

    // ----------------------
    //   Ingestion (trusted upstream producer)
    // ----------------------

    /// Handle scan start: run the descriptor stage of the chain, record every
    /// descriptor into the known-keys map, then deliver each client its
    /// subscribed subset.
    pub fn scan_start(&self, scan_id: u64, descriptors: Vec<StreamDescriptor>) {
        info!(scan_id, "scan start received");

        let mut descriptors = descriptors;
        for processor in self.chain.snapshot() {
            descriptors = processor.process_descriptors(scan_id, descriptors);
        }

        let deliveries = {
            let mut state = self.state.lock().unwrap();
            state.scan_id = scan_id;
            // All descriptors are recorded before any per-client filtering,
            // so introspection sees streams nobody subscribed to.
            for key in &descriptors {
                state.known_keys.insert(key.name.clone(), key.clone());
            }
            snapshot_filtered(&state, &descriptors, |key| key.name.as_str())
        };

        for (id, handle, to_send) in deliveries {
            debug!(client = %id, descriptors = to_send.len(), "forwarding descriptors");
            if let Err(DeliveryError::ConnectionLost) = handle.scan_start(scan_id, to_send) {
                self.drop_lost_client(id, &handle);
            }
        }
    }

    /// Handle one batch of frames: run the frame stage of the chain, then
    /// deliver each client its subscribed subset, skipping empty subsets.
    pub fn push_data(&self, frames: Vec<DataFrame>) {
        let mut frames = frames;
        for processor in self.chain.snapshot() {
            frames = processor.process_frames(frames);
        }

        let deliveries = {
            let state = self.state.lock().unwrap();
            snapshot_filtered(&state, &frames, |frame| frame.name.as_str())
        };

        for (id, handle, to_send) in deliveries {
            if to_send.is_empty() {
                continue;
            }
            debug!(client = %id, frames = to_send.len(), "forwarding frames");
            if let Err(DeliveryError::ConnectionLost) = handle.data_update(to_send) {
                self.drop_lost_client(id, &handle);
            }
        }
    }

    /// Handle scan end: broadcast the status to every client, unfiltered.
    pub fn scan_end(&self, status: ScanStatus) {
        info!("scan end received");

        let deliveries: Vec<(ClientId, ClientHandle)> = {
            let state = self.state.lock().unwrap();
            state
                .clients
                .iter()
                .map(|client| (client.id, client.handle.clone()))
                .collect()
        };

        for (id, handle) in deliveries {
            if let Err(DeliveryError::ConnectionLost) = handle.scan_end(status.clone()) {
                self.drop_lost_client(id, &handle);
            }
        }
    }

    // ----------------------
    //   Teardown & introspection
    // ----------------------

    /// Tear down the client registered for `conn`.
    ///
    /// Removal is atomic across the client set, the subscription map and both
    /// directions of the connection mapping. Idempotent: a second call for an
    /// already-removed connection is a no-op.
    pub fn connection_closed(&self, conn: ConnectionId) {
        let mut state = self.state.lock().unwrap();
        match state.conn_to_client.remove(&conn) {
            Some(id) => {
                remove_client_locked(&mut state, id);
                info!(client = %id, %conn, "data client removed after connection loss");
            }
            None => debug!(%conn, "connection close for unknown data client ignored"),
        }
    }

    fn drop_lost_client(&self, id: ClientId, handle: &ClientHandle) {
        match handle.connection() {
            Some(conn) => self.connection_closed(conn),
            None => {
                let mut state = self.state.lock().unwrap();
                remove_client_locked(&mut state, id);
                info!(client = %id, "local data client removed after delivery failure");
            }
        }
    }

    /// Descriptors announced by the current scan (and earlier scans whose
    /// names were not overwritten), keyed by stream name.
    pub fn known_keys(&self) -> HashMap<String, StreamDescriptor> {
        self.state.lock().unwrap().known_keys.clone()
    }

    /// Identifier of the most recently started scan.
    pub fn scan_id(&self) -> u64 {
        self.state.lock().unwrap().scan_id
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().unwrap().clients.len()
    }
}

fn remove_client_locked(state: &mut RouterState, id: ClientId) {
    state.clients.retain(|client| client.id != id);
    state.subscriptions.remove(&id);
    state.local_names.retain(|_, v| *v != id);
    state.conn_to_client.retain(|_, v| *v != id);
}

/// Snapshot, per client, the subset of `items` its subscription matches.
fn snapshot_filtered<T: Clone>(
    state: &RouterState,
    items: &[T],
    name_of: impl Fn(&T) -> &str,
) -> Vec<(ClientId, ClientHandle, Vec<T>)> {
    state
        .clients
        .iter()
        .map(|client| {
            let to_send = match state.subscriptions.get(&client.id) {
                Some(subs) => items
                    .iter()
                    .filter(|item| matches_subscription(subs, name_of(item)))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            };
            (client.id, client.handle.clone(), to_send)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_types::data::FrameValues;
    use scan_types::{AuthError, ConnectionClosedCallback, DataProcessor, DataType};

    struct AllowAll;
    impl SessionGateway for AllowAll {
        fn verify(&self, _conn: ConnectionId) -> Result<(), AuthError> {
            Ok(())
        }
        fn set_connection_closed_callback(
            &self,
            _conn: ConnectionId,
            _callback: ConnectionClosedCallback,
        ) {
        }
    }

    struct RejectAll;
    impl SessionGateway for RejectAll {
        fn verify(&self, _conn: ConnectionId) -> Result<(), AuthError> {
            Err(AuthError::Unauthorized)
        }
        fn set_connection_closed_callback(
            &self,
            _conn: ConnectionId,
            _callback: ConnectionClosedCallback,
        ) {
        }
    }

    #[derive(Debug, PartialEq)]
    enum Recorded {
        Start(u64, Vec<String>),
        Data(Vec<String>),
        End(ScanStatus),
    }

    #[derive(Default)]
    struct RecordingClient {
        events: Mutex<Vec<Recorded>>,
    }

    impl RecordingClient {
        fn take(&self) -> Vec<Recorded> {
            std::mem::take(&mut self.events.lock().unwrap())
        }
    }

    impl DataClientCallback for RecordingClient {
        fn scan_start(
            &self,
            scan_id: u64,
            descriptors: &[StreamDescriptor],
        ) -> Result<(), DeliveryError> {
            let names = descriptors.iter().map(|d| d.name.clone()).collect();
            self.events.lock().unwrap().push(Recorded::Start(scan_id, names));
            Ok(())
        }

        fn data_update(&self, frames: &[DataFrame]) -> Result<(), DeliveryError> {
            let names = frames.iter().map(|f| f.name.clone()).collect();
            self.events.lock().unwrap().push(Recorded::Data(names));
            Ok(())
        }

        fn scan_end(&self, status: &ScanStatus) -> Result<(), DeliveryError> {
            self.events.lock().unwrap().push(Recorded::End(status.clone()));
            Ok(())
        }
    }

    struct FailingClient;
    impl DataClientCallback for FailingClient {
        fn scan_start(&self, _: u64, _: &[StreamDescriptor]) -> Result<(), DeliveryError> {
            Err(DeliveryError::ConnectionLost)
        }
        fn data_update(&self, _: &[DataFrame]) -> Result<(), DeliveryError> {
            Err(DeliveryError::ConnectionLost)
        }
        fn scan_end(&self, _: &ScanStatus) -> Result<(), DeliveryError> {
            Err(DeliveryError::ConnectionLost)
        }
    }

    fn router() -> Arc<DataRouter> {
        DataRouter::new(Arc::new(AllowAll))
    }

    fn frame(name: &str) -> DataFrame {
        DataFrame::new(name, 0, FrameValues::Float64(vec![1.0]))
    }

    #[test]
    fn wildcard_matches_everything_but_reserved_names() {
        let router = router();
        let client = Arc::new(RecordingClient::default());
        router.register_local_client("viewer", client.clone());
        router.local_subscribe_all("viewer").unwrap();

        router.push_data(vec![frame("temp"), frame("__internal")]);

        assert_eq!(client.take(), vec![Recorded::Data(vec!["temp".into()])]);
    }

    #[test]
    fn reserved_name_still_matches_exact_subscription() {
        let router = router();
        let client = Arc::new(RecordingClient::default());
        router.register_local_client("viewer", client.clone());
        router
            .local_subscribe("viewer", vec!["__internal".into()])
            .unwrap();

        router.push_data(vec![frame("temp"), frame("__internal")]);

        assert_eq!(client.take(), vec![Recorded::Data(vec!["__internal".into()])]);
    }

    #[test]
    fn processors_compose_in_insertion_order() {
        struct Suffix(&'static str);
        impl DataProcessor for Suffix {
            fn process_descriptors(
                &self,
                _scan_id: u64,
                descriptors: Vec<StreamDescriptor>,
            ) -> Vec<StreamDescriptor> {
                descriptors
                    .into_iter()
                    .map(|mut d| {
                        d.name.push_str(self.0);
                        d
                    })
                    .collect()
            }
        }

        let router = router();
        let client = Arc::new(RecordingClient::default());
        router.register_local_client("viewer", client.clone());
        router.local_subscribe_all("viewer").unwrap();

        router.append_processor(Arc::new(Suffix("-a")));
        router.append_processor(Arc::new(Suffix("-b")));
        router.scan_start(1, vec![StreamDescriptor::scalar("temp")]);

        assert_eq!(
            client.take(),
            vec![Recorded::Start(1, vec!["temp-a-b".into()])]
        );
    }

    #[test]
    fn one_lost_client_does_not_stop_the_broadcast() {
        let router = router();
        let first = Arc::new(RecordingClient::default());
        let third = Arc::new(RecordingClient::default());
        router.register_local_client("first", first.clone());
        router.register_local_client("second", Arc::new(FailingClient));
        router.register_local_client("third", third.clone());
        assert_eq!(router.client_count(), 3);

        router.scan_end(ScanStatus::Completed);

        assert_eq!(first.take(), vec![Recorded::End(ScanStatus::Completed)]);
        assert_eq!(third.take(), vec![Recorded::End(ScanStatus::Completed)]);
        // The failing client was cleaned up by the delivery failure.
        assert_eq!(router.client_count(), 2);
    }

    #[test]
    fn connection_close_is_idempotent() {
        let router = router();
        let conn = ConnectionId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        router.register_remote_client(conn, tx).unwrap();
        assert_eq!(router.client_count(), 1);

        router.connection_closed(conn);
        assert_eq!(router.client_count(), 0);
        // Second close for the same connection must be a silent no-op.
        router.connection_closed(conn);
        assert_eq!(router.client_count(), 0);
    }

    #[test]
    fn remote_delivery_failure_triggers_cleanup() {
        let router = router();
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        router.register_remote_client(conn, tx).unwrap();
        router.subscribe_all(conn).unwrap();
        drop(rx);

        router.push_data(vec![frame("temp")]);

        assert_eq!(router.client_count(), 0);
    }

    #[test]
    fn scan_end_ignores_subscriptions() {
        let router = router();
        let client = Arc::new(RecordingClient::default());
        router.register_local_client("viewer", client.clone());
        // No subscription at all; data is filtered out but scan end arrives.
        router.push_data(vec![frame("temp")]);
        router.scan_end(ScanStatus::Aborted);

        assert_eq!(client.take(), vec![Recorded::End(ScanStatus::Aborted)]);
    }

    #[test]
    fn scan_start_reaches_clients_with_empty_subset() {
        let router = router();
        let client = Arc::new(RecordingClient::default());
        router.register_local_client("viewer", client.clone());

        router.scan_start(3, vec![StreamDescriptor::scalar("temp")]);

        // The start notification itself is delivered even when nothing matched.
        assert_eq!(client.take(), vec![Recorded::Start(3, vec![])]);
    }

    #[test]
    fn unsubscribe_of_absent_item_is_a_noop() {
        let router = router();
        let conn = ConnectionId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register_remote_client(conn, tx).unwrap();
        router.subscribe(conn, vec!["temp".into()]).unwrap();

        router.unsubscribe(conn, &["never_subscribed".into()]).unwrap();

        router.push_data(vec![frame("temp")]);
        match rx.try_recv().unwrap() {
            DataClientMessage::DataUpdate { frames } => {
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].name, "temp");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn known_keys_recorded_regardless_of_subscriptions() {
        let router = router();
        let client = Arc::new(RecordingClient::default());
        router.register_local_client("viewer", client.clone());
        // Subscribed to nothing; the key must be recorded anyway.
        router.scan_start(5, vec![StreamDescriptor::scalar("__hidden")]);

        assert!(router.known_keys().contains_key("__hidden"));
        assert_eq!(router.scan_id(), 5);
    }

    #[test]
    fn new_scan_overwrites_known_keys_by_name() {
        let router = router();
        router.scan_start(
            1,
            vec![StreamDescriptor::new("temp", DataType::Int64, vec![])],
        );
        router.scan_start(2, vec![StreamDescriptor::scalar("temp")]);

        let keys = router.known_keys();
        assert_eq!(keys["temp"].dtype, DataType::Float64);
    }

    #[test]
    fn unauthorized_registration_mutates_nothing() {
        let router = DataRouter::new(Arc::new(RejectAll));
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = router.register_remote_client(ConnectionId::new(), tx);
        assert_eq!(result.unwrap_err(), RouterError::Unauthorized);
        assert_eq!(router.client_count(), 0);
    }

    #[test]
    fn subscribe_with_unknown_connection_fails() {
        let router = router();
        let result = router.subscribe(ConnectionId::new(), vec!["temp".into()]);
        assert!(matches!(result, Err(RouterError::UnknownClient(_))));
    }
}
