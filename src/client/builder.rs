//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for configuring [`ConnectionConfig`] instances.
//!
//! # Example
//!
//! ```no_run
//! use chatflow_ws::ConnectionConfig;
//!
//! # fn example() -> chatflow_ws::Result<()> {
//! let config = ConnectionConfig::builder("ws://localhost:3000/ws", "flow-1")
//!     .on_open(|| println!("connected"))
//!     .on_close(|info| println!("closed: {info}"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::transport::CloseInfo;

use super::config::{
    CloseHandler, ConnectionConfig, ErrorHandler, MessageHandler, OpenHandler, ReconnectPolicy,
};

// ============================================================================
// ConnectionConfigBuilder
// ============================================================================

/// Builder for a [`ConnectionConfig`].
///
/// Use [`ConnectionConfig::builder()`] to create a new builder.
pub struct ConnectionConfigBuilder {
    /// Endpoint URL, validated in `build()`.
    url: String,
    /// Chatflow routing identifier.
    chatflowid: String,
    /// Chat session ID.
    chat_id: Option<String>,
    /// Reconnect policy.
    reconnect: ReconnectPolicy,
    on_message: Option<MessageHandler>,
    on_open: Option<OpenHandler>,
    on_close: Option<CloseHandler>,
    on_error: Option<ErrorHandler>,
}

// ============================================================================
// ConnectionConfigBuilder Implementation
// ============================================================================

impl ConnectionConfigBuilder {
    /// Creates a builder with no callbacks and the default reconnect policy.
    #[must_use]
    pub fn new(url: impl Into<String>, chatflowid: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chatflowid: chatflowid.into(),
            chat_id: None,
            reconnect: ReconnectPolicy::default(),
            on_message: None,
            on_open: None,
            on_close: None,
            on_error: None,
        }
    }

    /// Sets the chat session ID.
    #[inline]
    #[must_use]
    pub fn chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the inbound message callback.
    #[inline]
    #[must_use]
    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.on_message = Some(Box::new(handler));
        self
    }

    /// Sets the open callback.
    #[inline]
    #[must_use]
    pub fn on_open<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_open = Some(Box::new(handler));
        self
    }

    /// Sets the close callback.
    #[inline]
    #[must_use]
    pub fn on_close<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CloseInfo) + Send + Sync + 'static,
    {
        self.on_close = Some(Box::new(handler));
        self
    }

    /// Sets the error callback.
    #[inline]
    #[must_use]
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::Config`] if the scheme is not `ws`/`wss`
    /// - [`Error::Config`] if the chatflow ID is empty
    pub fn build(self) -> Result<ConnectionConfig> {
        let url = self.validate_url()?;
        self.validate_chatflowid()?;

        Ok(ConnectionConfig {
            url,
            chatflowid: self.chatflowid,
            chat_id: self.chat_id,
            reconnect: self.reconnect,
            on_message: self.on_message,
            on_open: self.on_open,
            on_close: self.on_close,
            on_error: self.on_error,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionConfigBuilder {
    /// Validates the endpoint URL.
    fn validate_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::config(format!(
                "Unsupported URL scheme '{other}' in {}\n\
                 Use a ws:// or wss:// endpoint.",
                self.url
            ))),
        }
    }

    /// Validates the chatflow ID.
    fn validate_chatflowid(&self) -> Result<()> {
        if self.chatflowid.trim().is_empty() {
            return Err(Error::config("chatflowid must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_new_has_defaults() {
        let builder = ConnectionConfigBuilder::new("ws://localhost:3000", "flow");
        assert!(builder.chat_id.is_none());
        assert_eq!(builder.reconnect, ReconnectPolicy::default());
        assert!(builder.on_message.is_none());
        assert!(builder.on_error.is_none());
    }

    #[test]
    fn test_build_keeps_fields() {
        let config = ConnectionConfig::builder("wss://chat.example.com/ws", "flow-9")
            .chat_id("chat-1")
            .reconnect_policy(ReconnectPolicy::new(2, Duration::from_millis(10)))
            .build()
            .unwrap();

        assert_eq!(config.url().as_str(), "wss://chat.example.com/ws");
        assert_eq!(config.chatflowid(), "flow-9");
        assert_eq!(config.chat_id(), Some("chat-1"));
        assert_eq!(config.reconnect_policy().max_attempts, 2);
    }

    #[test]
    fn test_build_fails_with_unparsable_url() {
        let result = ConnectionConfig::builder("not a url", "flow").build();
        assert!(matches!(result, Err(Error::Url(_))));
    }

    #[test]
    fn test_build_fails_with_http_scheme() {
        let err = ConnectionConfig::builder("http://localhost:3000", "flow")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("ws://"));
    }

    #[test]
    fn test_build_fails_with_empty_chatflowid() {
        let err = ConnectionConfig::builder("ws://localhost:3000", "  ")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("chatflowid"));
    }
}
