//! Connection configuration and reconnect policy.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use chatflow_ws::{ConnectionConfig, ReconnectPolicy};
//!
//! # fn example() -> chatflow_ws::Result<()> {
//! let config = ConnectionConfig::builder("wss://chat.example.com/ws", "flow-42")
//!     .chat_id("chat-7")
//!     .reconnect_policy(ReconnectPolicy::new(3, Duration::from_millis(500)))
//!     .on_message(|message| println!("{:?}", message.data))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::protocol::Message;
use crate::transport::CloseInfo;

use super::builder::ConnectionConfigBuilder;

// ============================================================================
// Constants
// ============================================================================

/// Default number of reconnect attempts after an unclean close.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay; attempt `n` waits `n` times this.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

// ============================================================================
// Callback Types
// ============================================================================

/// Called for each decoded inbound message.
pub type MessageHandler = Box<dyn Fn(Message) + Send + Sync>;

/// Called when a link becomes ready.
pub type OpenHandler = Box<dyn Fn() + Send + Sync>;

/// Called when a link closes, clean or not.
pub type CloseHandler = Box<dyn Fn(&CloseInfo) + Send + Sync>;

/// Called on transport errors.
pub type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync>;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Linear-backoff reconnect policy.
///
/// After an unclean close the manager waits `base_delay × n` before attempt
/// `n`, for `n` in `1..=max_attempts`. A successful open starts the count
/// over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed between two successful opens.
    pub max_attempts: u32,
    /// Delay unit for the linear backoff.
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A policy that never reconnects.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(0, DEFAULT_RECONNECT_DELAY)
    }

    /// Returns `true` if another attempt may be scheduled after `attempts_made`.
    #[inline]
    #[must_use]
    pub const fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before the given 1-based attempt.
    #[inline]
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Immutable configuration for a [`ConnectionManager`](crate::ConnectionManager).
///
/// Use [`ConnectionConfig::builder()`] to create one.
pub struct ConnectionConfig {
    pub(super) url: Url,
    pub(super) chatflowid: String,
    pub(super) chat_id: Option<String>,
    pub(super) reconnect: ReconnectPolicy,
    pub(super) on_message: Option<MessageHandler>,
    pub(super) on_open: Option<OpenHandler>,
    pub(super) on_close: Option<CloseHandler>,
    pub(super) on_error: Option<ErrorHandler>,
}

impl ConnectionConfig {
    /// Creates a builder for the given endpoint and chatflow ID.
    #[inline]
    #[must_use]
    pub fn builder(
        url: impl Into<String>,
        chatflowid: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(url, chatflowid)
    }

    /// Endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Chatflow routing identifier.
    #[inline]
    #[must_use]
    pub fn chatflowid(&self) -> &str {
        &self.chatflowid
    }

    /// Chat session ID, if any.
    #[inline]
    #[must_use]
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.reconnect
    }
}

// ============================================================================
// ConnectionConfig - Callback Dispatch
// ============================================================================

impl ConnectionConfig {
    pub(crate) fn notify_message(&self, message: Message) {
        if let Some(handler) = &self.on_message {
            handler(message);
        }
    }

    pub(crate) fn notify_open(&self) {
        if let Some(handler) = &self.on_open {
            handler();
        }
    }

    pub(crate) fn notify_close(&self, info: &CloseInfo) {
        if let Some(handler) = &self.on_close {
            handler(info);
        }
    }

    pub(crate) fn notify_error(&self, error: &Error) {
        if let Some(handler) = &self.on_error {
            handler(error);
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url.as_str())
            .field("chatflowid", &self.chatflowid)
            .field("chat_id", &self.chat_id)
            .field("reconnect", &self.reconnect)
            .field("on_message", &self.on_message.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
