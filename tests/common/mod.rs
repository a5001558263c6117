//! Shared helpers for integration tests.
//!
//! Provides an in-memory transport driven by the test, a callback recorder, and
//! logging initialization.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chatflow_ws::{
    CloseInfo, ConnectionConfig, ConnectionConfigBuilder, ConnectionManager, Error, EventSender,
    Message, ReconnectPolicy, Transport, TransportEvent, TransportLink,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;
use url::Url;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint used by mock-transport tests.
pub const TEST_URL: &str = "ws://chat.test/ws";

/// Upper bound for any single wait. Time is paused in most tests, so this
/// elapses instantly when something never arrives.
const WAIT_LIMIT: Duration = Duration::from_secs(3600);

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockTransport
// ============================================================================

/// Transport that hands each opened link to the test as a [`MockPeer`].
pub struct MockTransport {
    peers: mpsc::UnboundedSender<MockPeer>,
    opens: Arc<AtomicUsize>,
}

/// Creates a mock transport and the receiver its links arrive on.
pub fn mock_transport() -> (MockTransport, mpsc::UnboundedReceiver<MockPeer>) {
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();
    let transport = MockTransport {
        peers: peers_tx,
        opens: Arc::new(AtomicUsize::new(0)),
    };
    (transport, peers_rx)
}

impl Transport for MockTransport {
    fn open(&self, address: &Url, events: EventSender) -> chatflow_ws::Result<Arc<dyn TransportLink>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let close_requested = Arc::new(AtomicBool::new(false));

        let peer = MockPeer {
            address: address.clone(),
            events,
            outbound: outbound_rx,
            close_requested: Arc::clone(&close_requested),
        };
        self.peers
            .send(peer)
            .map_err(|_| Error::connection("test dropped its peer receiver"))?;

        Ok(Arc::new(MockLink {
            outbound: outbound_tx,
            close_requested,
        }))
    }
}

struct MockLink {
    outbound: mpsc::UnboundedSender<String>,
    close_requested: Arc<AtomicBool>,
}

impl TransportLink for MockLink {
    fn send(&self, text: String) -> chatflow_ws::Result<()> {
        self.outbound.send(text).map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// MockPeer
// ============================================================================

/// Test-side end of one opened link.
pub struct MockPeer {
    /// Address the manager opened.
    pub address: Url,
    events: EventSender,
    outbound: mpsc::UnboundedReceiver<String>,
    close_requested: Arc<AtomicBool>,
}

impl MockPeer {
    /// Reports the link as open.
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    /// Delivers an inbound text frame.
    pub fn deliver(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Message(text.to_string()));
    }

    /// Reports a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self
            .events
            .send(TransportEvent::Errored(Error::connection(message)));
    }

    /// Reports the start of the closing handshake.
    pub fn closing(&self) {
        let _ = self.events.send(TransportEvent::Closing);
    }

    /// Reports the link as closed.
    pub fn close(&self, info: CloseInfo) {
        let _ = self.events.send(TransportEvent::Closed(info));
    }

    /// Simulates a refused handshake: error followed by abnormal close.
    pub fn refuse(&self) {
        self.fail("connection refused");
        self.close(CloseInfo::abnormal());
    }

    /// Simulates a network drop on an open link.
    pub fn drop_connection(&self) {
        self.close(CloseInfo::abnormal());
    }

    /// Returns `true` once the manager asked this link to close.
    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    /// Returns the next frame the manager transmitted, if any.
    pub fn try_sent(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }
}

// ============================================================================
// Observed
// ============================================================================

/// A callback invocation recorded by the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Open,
    Message(Message),
    Close(CloseInfo),
    Error(String),
}

/// Wires all four callbacks of `builder` into a channel.
pub fn record_callbacks(
    builder: ConnectionConfigBuilder,
) -> (ConnectionConfig, mpsc::UnboundedReceiver<Observed>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let on_open = tx.clone();
    let on_message = tx.clone();
    let on_close = tx.clone();
    let on_error = tx;

    let config = builder
        .on_open(move || {
            let _ = on_open.send(Observed::Open);
        })
        .on_message(move |message| {
            let _ = on_message.send(Observed::Message(message));
        })
        .on_close(move |info| {
            let _ = on_close.send(Observed::Close(info.clone()));
        })
        .on_error(move |error| {
            let _ = on_error.send(Observed::Error(error.to_string()));
        })
        .build()
        .expect("test config should be valid");

    (config, rx)
}

// ============================================================================
// Harness
// ============================================================================

/// A manager over [`MockTransport`] with its callbacks recorded.
pub struct Harness {
    pub manager: ConnectionManager,
    pub peers: mpsc::UnboundedReceiver<MockPeer>,
    pub observed: mpsc::UnboundedReceiver<Observed>,
    pub opens: Arc<AtomicUsize>,
}

impl Harness {
    /// Creates a harness with the given reconnect policy.
    pub fn new(policy: ReconnectPolicy) -> Self {
        init_logging();

        let builder = ConnectionConfig::builder(TEST_URL, "flow-test").reconnect_policy(policy);
        let (config, observed) = record_callbacks(builder);
        let (transport, peers) = mock_transport();
        let opens = Arc::clone(&transport.opens);

        Self {
            manager: ConnectionManager::with_transport(config, transport),
            peers,
            observed,
            opens,
        }
    }

    /// Waits for the manager to open its next link.
    pub async fn next_peer(&mut self) -> MockPeer {
        timeout(WAIT_LIMIT, self.peers.recv())
            .await
            .expect("timed out waiting for a link to open")
            .expect("transport dropped")
    }

    /// Waits for the next callback invocation.
    pub async fn next_observed(&mut self) -> Observed {
        timeout(WAIT_LIMIT, self.observed.recv())
            .await
            .expect("timed out waiting for a callback")
            .expect("recorder dropped")
    }

    /// Starts `connect()` in the background and returns its join handle.
    pub fn spawn_connect(&self) -> tokio::task::JoinHandle<chatflow_ws::Result<()>> {
        let manager = self.manager.clone();
        tokio::spawn(async move { manager.connect().await })
    }

    /// Connects and opens the first link.
    pub async fn connect_open(&mut self) -> MockPeer {
        let connect = self.spawn_connect();
        let peer = self.next_peer().await;
        peer.open();

        connect
            .await
            .expect("connect task panicked")
            .expect("connect should succeed");
        assert_eq!(self.next_observed().await, Observed::Open);
        peer
    }

    /// Returns `true` if no callback fired since the last `next_observed`.
    pub fn no_new_observed(&mut self) -> bool {
        self.observed.try_recv().is_err()
    }

    /// Returns `true` if no link was opened since the last `next_peer`.
    pub fn no_new_peer(&mut self) -> bool {
        self.peers.try_recv().is_err()
    }
}
