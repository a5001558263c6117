//! Connection manager with automatic reconnection.
//!
//! # Reconnect State Machine
//!
//! ```text
//! Idle ──connect()──► Connecting ──opened──► Connected
//!                        ▲                      │ closing
//!                        │                      ▼
//!                        │                   Closing
//!                        │                      │ closed
//!                        │                      ▼
//!                        │            Disconnected { clean }
//!                        │                      │ unclean and attempts < max
//!                        └──── timer (base × n) ┘
//! ```
//!
//! A clean close is terminal for the connection lifetime. An unclean close
//! schedules attempt `n` after `base_delay × n`, up to `max_attempts`.
//! `disconnect()` cancels any pending attempt.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::transport::{
    CloseInfo, EventReceiver, ReadyState, Transport, TransportEvent, TransportLink,
    WebSocketTransport,
};

use super::config::ConnectionConfig;

// ============================================================================
// Types
// ============================================================================

/// Completion channel for a single `connect()` call.
type Completion = oneshot::Sender<Result<()>>;

/// Result of registering a new link: the caller's completion receiver and
/// any link it replaced.
type Opening = (oneshot::Receiver<Result<()>>, Option<ActiveLink>);

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection lifecycle as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Opening a link (first connect or reconnect attempt).
    Connecting,
    /// Link open.
    Connected,
    /// Closing handshake in progress. Nothing can be sent.
    Closing,
    /// Link closed. Unclean closes may be followed by a reconnect.
    Disconnected {
        /// `true` if the close was clean or caller-initiated.
        clean: bool,
    },
}

impl ConnectionState {
    /// Returns `true` if a link is open.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// The link currently owned by the manager.
struct ActiveLink {
    /// Identifies the link's events.
    id: u64,
    link: Arc<dyn TransportLink>,
    ready: ReadyState,
}

/// Mutable manager state. Callbacks never run while this is locked.
struct Shared {
    current: Option<ActiveLink>,
    next_link_id: u64,
    reconnect_attempts: u32,
    state: ConnectionState,
    /// Bumped by `disconnect()`; timers from older epochs never fire.
    epoch: u64,
    reconnect_timer: Option<AbortHandle>,
}

impl Shared {
    fn new() -> Self {
        Self {
            current: None,
            next_link_id: 0,
            reconnect_attempts: 0,
            state: ConnectionState::Idle,
            epoch: 0,
            reconnect_timer: None,
        }
    }

    #[inline]
    fn is_current(&self, link_id: u64) -> bool {
        self.current.as_ref().is_some_and(|active| active.id == link_id)
    }

    #[inline]
    fn open_link(&self) -> Option<&Arc<dyn TransportLink>> {
        self.current
            .as_ref()
            .filter(|active| active.ready == ReadyState::Open)
            .map(|active| &active.link)
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Resilient client connection.
///
/// Wraps one transport link at a time, forwards its events to the callbacks
/// in [`ConnectionConfig`], and reopens the link after unclean closes.
///
/// Cloning is cheap; clones share the same connection. Background tasks keep
/// the connection alive after the last clone is dropped, so call
/// [`disconnect()`](Self::disconnect) to tear it down.
///
/// # Example
///
/// ```no_run
/// use chatflow_ws::{ConnectionConfig, ConnectionManager, Message};
///
/// # async fn example() -> chatflow_ws::Result<()> {
/// let config = ConnectionConfig::builder("ws://localhost:3000/ws", "flow-1")
///     .on_message(|message| println!("{:?}: {}", message.message_type, message.data))
///     .build()?;
///
/// let manager = ConnectionManager::new(config);
/// manager.connect().await?;
/// manager.send(&Message::user("hello"));
/// manager.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    shared: Mutex<Shared>,
}

// ============================================================================
// ConnectionManager - Constructor
// ============================================================================

impl ConnectionManager {
    /// Creates a manager that connects over WebSocket.
    ///
    /// No connection is made until [`connect()`](Self::connect).
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_transport(config, WebSocketTransport::new())
    }

    /// Creates a manager over a custom transport.
    #[must_use]
    pub fn with_transport(config: ConnectionConfig, transport: impl Transport) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport: Arc::new(transport),
                shared: Mutex::new(Shared::new()),
            }),
        }
    }
}

// ============================================================================
// ConnectionManager - Public API
// ============================================================================

impl ConnectionManager {
    /// Opens a link to the configured URL.
    ///
    /// Resolves once the link opens. Only this call observes the result;
    /// automatic reconnects report through the callbacks alone. Calling this
    /// while a link is live replaces that link.
    ///
    /// There is no timeout: if the transport neither opens, errors nor
    /// closes, the future stays pending.
    ///
    /// # Errors
    ///
    /// - The transport error if the link fails before opening
    /// - [`Error::ConnectionClosed`] if the link closes before opening
    pub async fn connect(&self) -> Result<()> {
        let completion = self.inner.start_connect()?;
        completion.await.unwrap_or(Err(Error::ConnectionClosed))
    }

    /// Sends a message, dropping it if not connected.
    ///
    /// Never queues and never fails; problems are logged. Use
    /// [`try_send()`](Self::try_send) to observe them.
    pub fn send(&self, message: &Message) {
        match self.try_send(message) {
            Ok(()) => {}
            Err(Error::NotConnected) => {
                warn!(
                    message_type = message.message_type.as_str(),
                    "Not connected, dropping message"
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to send message");
            }
        }
    }

    /// Sends a message if the link is open.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no link is open
    /// - [`Error::Json`] if the message cannot be serialized
    /// - [`Error::ConnectionClosed`] if the link shut down underneath
    pub fn try_send(&self, message: &Message) -> Result<()> {
        let link = {
            let shared = self.inner.shared.lock();
            shared.open_link().cloned().ok_or(Error::NotConnected)?
        };

        let text = message.encode()?;
        link.send(text)?;

        trace!(
            message_type = message.message_type.as_str(),
            "Message sent"
        );
        Ok(())
    }

    /// Closes the current link and cancels any pending reconnect.
    ///
    /// Never triggers a reconnect. Safe to call at any time.
    pub fn disconnect(&self) {
        let (timer, active) = {
            let mut shared = self.inner.shared.lock();
            shared.epoch = shared.epoch.wrapping_add(1);

            if shared.state != ConnectionState::Idle {
                shared.state = ConnectionState::Disconnected { clean: true };
            }

            (shared.reconnect_timer.take(), shared.current.take())
        };

        if let Some(timer) = timer {
            timer.abort();
            debug!("Pending reconnect cancelled");
        }

        match active {
            Some(active) => {
                info!(link_id = active.id, "Disconnecting");
                active.link.close();
            }
            None => debug!("Disconnect with no live link"),
        }
    }

    /// Returns `true` if a link is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.shared.lock().open_link().is_some()
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Reconnect attempts scheduled since the last successful open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect_attempts
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url().as_str())
            .field("state", &shared.state)
            .field("reconnect_attempts", &shared.reconnect_attempts)
            .finish()
    }
}

// ============================================================================
// Inner - Opening Links
// ============================================================================

impl Inner {
    /// Opens a link on behalf of a caller's `connect()`.
    fn start_connect(self: &Arc<Self>) -> Result<oneshot::Receiver<Result<()>>> {
        let result = {
            let mut shared = self.shared.lock();

            // An explicit connect supersedes a scheduled one
            if let Some(timer) = shared.reconnect_timer.take() {
                timer.abort();
                debug!("Pending reconnect superseded by connect()");
            }

            self.begin_connect(&mut shared)
        };

        self.finish_connect(result)
    }

    /// Runs a scheduled reconnect unless the manager moved on meanwhile.
    fn fire_reconnect(self: &Arc<Self>, epoch: u64, attempt: u32) {
        let result = {
            let mut shared = self.shared.lock();

            if shared.epoch != epoch || shared.current.is_some() {
                debug!(attempt, "Reconnect no longer needed");
                return;
            }
            shared.reconnect_timer = None;

            info!(
                attempt,
                max = self.config.reconnect_policy().max_attempts,
                "Attempting to reconnect"
            );
            self.begin_connect(&mut shared)
        };

        // Nobody awaits a reconnect; its outcome reaches the callbacks only
        if let Err(e) = self.finish_connect(result) {
            debug!(attempt, error = %e, "Reconnect attempt failed to start");
            self.schedule_reconnect(epoch);
        }
    }

    /// Opens a link and makes it current. Runs under the state lock.
    fn begin_connect(self: &Arc<Self>, shared: &mut Shared) -> Result<Opening> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        debug!(url = %self.config.url(), "Opening link");

        let link = match self.transport.open(self.config.url(), events_tx) {
            Ok(link) => link,
            Err(e) => {
                shared.state = ConnectionState::Disconnected { clean: false };
                return Err(e);
            }
        };

        shared.next_link_id = shared.next_link_id.wrapping_add(1);
        let link_id = shared.next_link_id;

        let superseded = shared.current.replace(ActiveLink {
            id: link_id,
            link,
            ready: ReadyState::Connecting,
        });
        shared.state = ConnectionState::Connecting;

        tokio::spawn(Arc::clone(self).run_event_loop(link_id, events_rx, done_tx));

        Ok((done_rx, superseded))
    }

    /// Post-lock half of opening: closes a replaced link or reports failure.
    fn finish_connect(&self, result: Result<Opening>) -> Result<oneshot::Receiver<Result<()>>> {
        match result {
            Ok((completion, superseded)) => {
                if let Some(old) = superseded {
                    warn!(link_id = old.id, "Replacing live link");
                    old.link.close();
                }
                Ok(completion)
            }
            Err(e) => {
                error!(error = %e, "Failed to open transport");
                self.config.notify_error(&e);
                Err(e)
            }
        }
    }
}

// ============================================================================
// Inner - Event Loop
// ============================================================================

impl Inner {
    /// Dispatches one link's events in order until it closes.
    async fn run_event_loop(
        self: Arc<Self>,
        link_id: u64,
        mut events: EventReceiver,
        done_tx: Completion,
    ) {
        let mut completion = Some(done_tx);

        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Opened => self.handle_opened(link_id, &mut completion),
                TransportEvent::Message(text) => self.handle_frame(link_id, &text),
                TransportEvent::Closing => self.handle_closing(link_id),
                TransportEvent::Errored(error) => {
                    self.handle_error(link_id, error, &mut completion);
                }
                TransportEvent::Closed(info) => {
                    self.handle_closed(link_id, info, &mut completion);
                    return;
                }
            }
        }

        debug!(link_id, "Event channel dropped without a close");
        self.handle_closed(link_id, CloseInfo::abnormal(), &mut completion);
    }

    fn handle_opened(&self, link_id: u64, completion: &mut Option<Completion>) {
        {
            let mut shared = self.shared.lock();
            match shared.current.as_mut() {
                Some(active) if active.id == link_id => active.ready = ReadyState::Open,
                _ => {
                    debug!(link_id, "Ignoring open from released link");
                    return;
                }
            }
            shared.reconnect_attempts = 0;
            shared.state = ConnectionState::Connected;
        }

        info!(link_id, url = %self.config.url(), "Connected");
        self.config.notify_open();

        if let Some(tx) = completion.take() {
            let _ = tx.send(Ok(()));
        }
    }

    fn handle_frame(&self, link_id: u64, text: &str) {
        if !self.shared.lock().is_current(link_id) {
            trace!(link_id, "Dropping frame from released link");
            return;
        }

        match Message::decode(text) {
            Ok(message) => {
                trace!(
                    message_type = message.message_type.as_str(),
                    "Message received"
                );
                self.config.notify_message(message);
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "Failed to parse inbound message");
            }
        }
    }

    fn handle_closing(&self, link_id: u64) {
        let mut shared = self.shared.lock();
        match shared.current.as_mut() {
            Some(active) if active.id == link_id => active.ready = ReadyState::Closing,
            _ => {
                trace!(link_id, "Released link is closing");
                return;
            }
        }
        shared.state = ConnectionState::Closing;
        debug!(link_id, "Closing handshake started");
    }

    fn handle_error(&self, link_id: u64, error: Error, completion: &mut Option<Completion>) {
        if self.shared.lock().is_current(link_id) {
            error!(link_id, error = %error, "Transport error");
            self.config.notify_error(&error);
        } else {
            debug!(link_id, error = %error, "Error from released link");
        }

        // A pending connect() is rejected even if its link was released
        if let Some(tx) = completion.take() {
            let _ = tx.send(Err(error));
        }
    }

    fn handle_closed(
        self: &Arc<Self>,
        link_id: u64,
        info: CloseInfo,
        completion: &mut Option<Completion>,
    ) {
        let epoch = {
            let mut shared = self.shared.lock();
            if shared.is_current(link_id) {
                shared.current = None;
                shared.state = ConnectionState::Disconnected {
                    clean: info.was_clean,
                };
                Some(shared.epoch)
            } else {
                None
            }
        };

        info!(
            link_id,
            code = info.code,
            reason = %info.reason,
            was_clean = info.was_clean,
            "Connection closed"
        );
        self.config.notify_close(&info);

        if let Some(tx) = completion.take() {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if let Some(epoch) = epoch
            && !info.was_clean
        {
            self.schedule_reconnect(epoch);
        }
    }
}

// ============================================================================
// Inner - Reconnect Policy
// ============================================================================

impl Inner {
    /// Schedules the next attempt after an unclean close, if allowed.
    fn schedule_reconnect(self: &Arc<Self>, epoch: u64) {
        let policy = self.config.reconnect_policy();
        let mut shared = self.shared.lock();

        // The close callback may have disconnected or connected again
        if shared.epoch != epoch || shared.current.is_some() {
            debug!("Manager changed during close, not reconnecting");
            return;
        }

        if !policy.allows(shared.reconnect_attempts) {
            warn!(
                attempts = shared.reconnect_attempts,
                max = policy.max_attempts,
                "Reconnect attempts exhausted"
            );
            return;
        }

        shared.reconnect_attempts += 1;
        let attempt = shared.reconnect_attempts;
        let delay = policy.delay_for(attempt);

        let inner = Arc::clone(self);
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            inner.fire_reconnect(epoch, attempt);
        });

        if let Some(previous) = shared.reconnect_timer.replace(timer.abort_handle()) {
            previous.abort();
        }

        info!(
            attempt,
            max = policy.max_attempts,
            ?delay,
            "Reconnect scheduled"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that counts opens and never emits events.
    #[derive(Default)]
    struct SilentTransport {
        opens: Arc<AtomicUsize>,
        // Held so event loops never see their channel close
        senders: Mutex<Vec<crate::transport::EventSender>>,
    }

    struct SilentLink;

    impl TransportLink for SilentLink {
        fn send(&self, _text: String) -> Result<()> {
            Ok(())
        }

        fn close(&self) {}
    }

    impl Transport for SilentTransport {
        fn open(
            &self,
            _address: &url::Url,
            events: crate::transport::EventSender,
        ) -> Result<Arc<dyn TransportLink>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.senders.lock().push(events);
            Ok(Arc::new(SilentLink))
        }
    }

    /// Transport whose open always fails synchronously.
    struct FailingTransport;

    impl Transport for FailingTransport {
        fn open(
            &self,
            _address: &url::Url,
            _events: crate::transport::EventSender,
        ) -> Result<Arc<dyn TransportLink>> {
            Err(Error::connection("no route"))
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::builder("ws://127.0.0.1:9", "flow")
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_manager_is_idle() {
        let manager = ConnectionManager::with_transport(config(), SilentTransport::default());
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(manager.reconnect_attempts(), 0);
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_disconnect_before_connect_makes_no_transport_calls() {
        let transport = SilentTransport::default();
        let opens = Arc::clone(&transport.opens);
        let manager = ConnectionManager::with_transport(config(), transport);

        manager.disconnect();
        manager.disconnect();

        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_send_while_idle_is_dropped() {
        let manager = ConnectionManager::with_transport(config(), SilentTransport::default());

        manager.send(&Message::user("lost"));
        assert!(matches!(
            manager.try_send(&Message::user("lost")),
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_is_pending_until_transport_reports() {
        let manager = ConnectionManager::with_transport(config(), SilentTransport::default());

        let mut connect = tokio_test::task::spawn(manager.connect());
        tokio_test::assert_pending!(connect.poll());

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_synchronous_open_failure_rejects_and_reports() {
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let config = ConnectionConfig::builder("ws://127.0.0.1:9", "flow")
            .on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let manager = ConnectionManager::with_transport(config, FailingTransport);

        let result = manager.connect().await;

        assert!(matches!(result, Err(Error::Connection { .. })));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            manager.state(),
            ConnectionState::Disconnected { clean: false }
        );
    }

    /// Transport that opens once, then refuses every later open.
    #[derive(Default)]
    struct OnceTransport {
        opens: Arc<AtomicUsize>,
        senders: Arc<Mutex<Vec<crate::transport::EventSender>>>,
    }

    impl Transport for OnceTransport {
        fn open(
            &self,
            _address: &url::Url,
            events: crate::transport::EventSender,
        ) -> Result<Arc<dyn TransportLink>> {
            if self.opens.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(Error::connection("no route"));
            }
            self.senders.lock().push(events);
            Ok(Arc::new(SilentLink))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnect_open_continues_backoff() {
        let transport = OnceTransport::default();
        let opens = Arc::clone(&transport.opens);
        let senders = Arc::clone(&transport.senders);
        let config = ConnectionConfig::builder("ws://127.0.0.1:9", "flow")
            .reconnect_policy(crate::ReconnectPolicy::new(3, std::time::Duration::from_millis(10)))
            .build()
            .unwrap();
        let manager = ConnectionManager::with_transport(config, transport);

        let connecting = manager.clone();
        let connect = tokio::spawn(async move { connecting.connect().await });
        while opens.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let events = senders.lock()[0].clone();
        events.send(TransportEvent::Opened).unwrap();
        connect.await.unwrap().unwrap();

        events.send(TransportEvent::Closed(CloseInfo::abnormal())).unwrap();
        sleep(std::time::Duration::from_secs(1)).await;

        assert_eq!(opens.load(Ordering::SeqCst), 4);
        assert_eq!(manager.reconnect_attempts(), 3);
        assert_eq!(
            manager.state(),
            ConnectionState::Disconnected { clean: false }
        );
    }

    #[test]
    fn test_state_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Closing.is_connected());
        assert!(!ConnectionState::Disconnected { clean: false }.is_connected());
    }
}
