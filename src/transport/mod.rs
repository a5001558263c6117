//! Transport layer.
//!
//! The connection manager never talks to a socket directly. It asks a
//! [`Transport`] to open a link and then reacts to the [`TransportEvent`]s
//! that link emits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐   open(url, events)    ┌─────────────────────┐
//! │  ConnectionManager  │───────────────────────►│  Transport          │
//! │                     │                        │                     │
//! │  event loop task    │◄── TransportEvent ─────│  link task          │
//! │                     │─── send / close ──────►│  (one per open)     │
//! └─────────────────────┘                        └─────────────────────┘
//! ```
//!
//! # Event Ordering
//!
//! A link emits at most one `Opened`, any number of `Message`s after it, and
//! exactly one `Closed` as its final event. `Closing` marks the start of the
//! closing handshake, from either side, and may precede `Closed`. `Errored`
//! may appear at any point before `Closed`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` transport |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport built on `tokio-tungstenite`.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::WebSocketTransport;

// ============================================================================
// Constants
// ============================================================================

/// Close code for a normal, acknowledged closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// Types
// ============================================================================

/// Sending half of a link's event channel.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of a link's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// ReadyState
// ============================================================================

/// Lifecycle state of a single transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Opening handshake in progress.
    Connecting,
    /// Ready to send and receive.
    Open,
    /// Closing handshake started; no more frames may be sent.
    Closing,
}

// ============================================================================
// CloseInfo
// ============================================================================

/// Details of a link closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close status code (`1006` for abnormal closure).
    pub code: u16,
    /// Close reason sent by the peer, empty if none.
    pub reason: String,
    /// `true` if the closing handshake completed.
    pub was_clean: bool,
}

impl CloseInfo {
    /// Creates a clean closure with the given code and reason.
    #[inline]
    #[must_use]
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// Creates an abnormal closure (code `1006`).
    #[inline]
    #[must_use]
    pub fn abnormal() -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
            was_clean: false,
        }
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.was_clean { "clean" } else { "unclean" };
        if self.reason.is_empty() {
            write!(f, "{} ({kind})", self.code)
        } else {
            write!(f, "{} {} ({kind})", self.code, self.reason)
        }
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle event emitted by a transport link.
#[derive(Debug)]
pub enum TransportEvent {
    /// Link is open and ready.
    Opened,
    /// Inbound text frame.
    Message(String),
    /// Closing handshake started by either side.
    Closing,
    /// Transport-level error.
    Errored(Error),
    /// Link closed. Always the final event.
    Closed(CloseInfo),
}

// ============================================================================
// Traits
// ============================================================================

/// Opens links to a remote endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Starts opening a link to `address`.
    ///
    /// Returns immediately. Progress is reported through `events`: either
    /// `Opened` or `Errored`, eventually followed by `Closed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot even be started. No events are
    /// emitted in that case.
    fn open(&self, address: &Url, events: EventSender) -> Result<Arc<dyn TransportLink>>;
}

/// A single open (or opening) link.
pub trait TransportLink: Send + Sync {
    /// Queues a text frame for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the link has shut down.
    fn send(&self, text: String) -> Result<()>;

    /// Starts a graceful close. Idempotent.
    fn close(&self);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_info_abnormal() {
        let info = CloseInfo::abnormal();
        assert_eq!(info.code, 1006);
        assert!(!info.was_clean);
        assert!(info.reason.is_empty());
    }

    #[test]
    fn test_close_info_display() {
        assert_eq!(CloseInfo::clean(1000, "bye").to_string(), "1000 bye (clean)");
        assert_eq!(CloseInfo::abnormal().to_string(), "1006 (unclean)");
    }
}
