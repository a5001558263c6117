//! WebSocket transport and link event loop.
//!
//! Each call to [`WebSocketTransport::open`] spawns a tokio task that owns
//! the socket for the lifetime of that link.
//!
//! # Event Loop
//!
//! The link task handles:
//!
//! - The opening handshake (`connect_async`)
//! - Incoming frames from the remote end
//! - Outgoing frames and close requests from the connection manager
//! - Translating the closing handshake into `Closing` and a single `Closed` event
//!
//! # Closing Handshake
//!
//! Whichever side starts the close, the link reports `Closing` at once and
//! then waits at most the close timeout for the socket to finish. A close
//! frame from the peer makes the close clean. If none arrives in time the
//! close is reported as `1006`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, CloseInfo, EventSender, Transport,
    TransportEvent, TransportLink,
};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the closing handshake.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// LinkCommand
// ============================================================================

/// Internal commands for the link task.
enum LinkCommand {
    /// Send a text frame.
    Send(String),
    /// Start the closing handshake.
    Close,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// [`Transport`] over WebSocket (`ws://` and `wss://`).
///
/// Must be used from within a tokio runtime.
///
/// # Example
///
/// ```ignore
/// use chatflow_ws::{ConnectionConfig, ConnectionManager, WebSocketTransport};
///
/// let config = ConnectionConfig::builder("ws://localhost:3000/ws", "flow-1").build()?;
/// let manager = ConnectionManager::with_transport(config, WebSocketTransport::new());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WebSocketTransport {
    /// How long a closing link waits for the socket to finish.
    close_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketTransport {
    /// Creates a new WebSocket transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Sets how long a closing link waits for the closing handshake.
    #[inline]
    #[must_use]
    pub const fn with_close_timeout(self, close_timeout: Duration) -> Self {
        Self { close_timeout }
    }

    /// Returns the closing handshake bound.
    #[inline]
    #[must_use]
    pub const fn close_timeout(&self) -> Duration {
        self.close_timeout
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, address: &Url, events: EventSender) -> Result<Arc<dyn TransportLink>> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::connection(format!("No tokio runtime: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        runtime.spawn(run_link(
            address.clone(),
            self.close_timeout,
            command_rx,
            events,
        ));

        Ok(Arc::new(WebSocketLink { command_tx }))
    }
}

// ============================================================================
// WebSocketLink
// ============================================================================

/// Handle to a link task.
///
/// Dropping the last reference closes the socket.
struct WebSocketLink {
    /// Channel for sending commands to the link task.
    command_tx: mpsc::UnboundedSender<LinkCommand>,
}

impl TransportLink for WebSocketLink {
    fn send(&self, text: String) -> Result<()> {
        self.command_tx
            .send(LinkCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.command_tx.send(LinkCommand::Close);
    }
}

// ============================================================================
// Link Task
// ============================================================================

/// Owns one WebSocket from handshake to final `Closed` event.
async fn run_link(
    address: Url,
    close_timeout: Duration,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    events: EventSender,
) {
    // Opening handshake, abandoned if the manager closes the link first
    let connecting = connect_async(address.as_str());
    tokio::pin!(connecting);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connecting => {
                match result {
                    Ok((stream, _response)) => break stream,
                    Err(e) => {
                        debug!(%address, error = %e, "WebSocket handshake failed");
                        let _ = events.send(TransportEvent::Errored(Error::WebSocket(e)));
                        let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal()));
                        return;
                    }
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Send(_)) => {
                        warn!("Dropping frame queued before the link opened");
                    }
                    Some(LinkCommand::Close) | None => {
                        debug!(%address, "Link closed before open");
                        let _ = events.send(TransportEvent::Closed(CloseInfo {
                            code: CLOSE_ABNORMAL,
                            reason: "closed before open".to_string(),
                            was_clean: false,
                        }));
                        return;
                    }
                }
            }
        }
    };

    debug!(%address, "WebSocket link open");
    let _ = events.send(TransportEvent::Opened);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    // Close frame received from the peer, if any
    let mut peer_close: Option<CloseInfo> = None;
    // Set once either side has started the closing handshake
    let mut close_deadline: Option<Instant> = None;

    let close_info = loop {
        tokio::select! {
            // Incoming frames from the remote end
            message = ws_read.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        trace!(len = text.len(), "Text frame received");
                        let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
                    }

                    Some(Ok(WsMessage::Binary(data))) => {
                        match String::from_utf8(data.to_vec()) {
                            Ok(text) => {
                                let _ = events.send(TransportEvent::Message(text));
                            }
                            Err(_) => warn!(len = data.len(), "Dropping non-UTF-8 binary frame"),
                        }
                    }

                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(?frame, "Close frame received");
                        peer_close = Some(close_frame_info(frame.as_ref()));

                        // Sends the queued reply to a peer-initiated close
                        if let Err(e) = ws_write.flush().await {
                            debug!(error = %e, "Close reply not sent");
                        }

                        if close_deadline.is_none() {
                            let _ = events.send(TransportEvent::Closing);
                            close_deadline = Some(Instant::now() + close_timeout);
                        }
                    }

                    Some(Err(e)) => {
                        if let Some(info) = peer_close.take() {
                            break info;
                        }
                        warn!(error = %e, "WebSocket error");
                        let _ = events.send(TransportEvent::Errored(Error::WebSocket(e)));
                        break CloseInfo::abnormal();
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break peer_close.take().unwrap_or_else(CloseInfo::abnormal);
                    }

                    // Ignore Ping, Pong, raw frames
                    Some(Ok(_)) => {}
                }
            }

            // Closing handshake took too long
            () = sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                debug!(?close_timeout, "Closing handshake timed out");
                break peer_close.take().unwrap_or_else(CloseInfo::abnormal);
            }

            // Commands from the connection manager
            command = command_rx.recv(), if close_deadline.is_none() => {
                match command {
                    Some(LinkCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(WsMessage::Text(text.into())).await {
                            warn!(error = %e, "Failed to send frame");
                        }
                    }

                    Some(LinkCommand::Close) | None => {
                        debug!("Starting closing handshake");
                        let _ = events.send(TransportEvent::Closing);
                        close_deadline = Some(Instant::now() + close_timeout);

                        let frame = CloseFrame {
                            code: CloseCode::from(CLOSE_NORMAL),
                            reason: "".into(),
                        };
                        if let Err(e) = ws_write.send(WsMessage::Close(Some(frame))).await {
                            debug!(error = %e, "Close frame not sent");
                        }
                    }
                }
            }
        }
    };

    debug!(close = %close_info, "WebSocket link terminated");
    let _ = events.send(TransportEvent::Closed(close_info));
}

/// Converts a received close frame into [`CloseInfo`].
fn close_frame_info(frame: Option<&CloseFrame>) -> CloseInfo {
    match frame {
        Some(frame) => CloseInfo::clean(u16::from(frame.code), frame.reason.as_str()),
        None => CloseInfo::clean(CLOSE_NO_STATUS, ""),
    }
}

// ============================================================================
// Tests
// ============================================================================
