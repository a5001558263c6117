//! Chat message type and wire encoding.
//!
//! # Format
//!
//! ```json
//! {
//!   "type": "bot_message",
//!   "data": { ... },
//!   "chatId": "optional-chat-id",
//!   "messageId": "optional-message-id"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// MessageType
// ============================================================================

/// Kind of a [`Message`], serialized as its `snake_case` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Generic message.
    Message,
    /// Message authored by the user.
    UserMessage,
    /// Message authored by the bot.
    BotMessage,
    /// Error reported by the remote end.
    Error,
    /// Connection status notification.
    ConnectionStatus,
}

impl MessageType {
    /// All message types, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Message,
        Self::UserMessage,
        Self::BotMessage,
        Self::Error,
        Self::ConnectionStatus,
    ];

    /// Returns the wire name of this type.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::UserMessage => "user_message",
            Self::BotMessage => "bot_message",
            Self::Error => "error",
            Self::ConnectionStatus => "connection_status",
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// A structured chat message exchanged with the remote end.
///
/// `data` is opaque to this crate; its shape is a contract between the
/// caller and the remote peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message kind.
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Caller-interpreted payload.
    #[serde(default)]
    pub data: Value,

    /// Chat session the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,

    /// Identifier of this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Message {
    /// Creates a message with no correlation fields.
    #[inline]
    #[must_use]
    pub fn new(message_type: MessageType, data: impl Into<Value>) -> Self {
        Self {
            message_type,
            data: data.into(),
            chat_id: None,
            message_id: None,
        }
    }

    /// Creates a `message` message.
    #[inline]
    #[must_use]
    pub fn message(data: impl Into<Value>) -> Self {
        Self::new(MessageType::Message, data)
    }

    /// Creates a `user_message` message.
    #[inline]
    #[must_use]
    pub fn user(data: impl Into<Value>) -> Self {
        Self::new(MessageType::UserMessage, data)
    }

    /// Creates a `bot_message` message.
    #[inline]
    #[must_use]
    pub fn bot(data: impl Into<Value>) -> Self {
        Self::new(MessageType::BotMessage, data)
    }

    /// Creates an `error` message.
    #[inline]
    #[must_use]
    pub fn error(data: impl Into<Value>) -> Self {
        Self::new(MessageType::Error, data)
    }

    /// Creates a `connection_status` message.
    #[inline]
    #[must_use]
    pub fn connection_status(data: impl Into<Value>) -> Self {
        Self::new(MessageType::ConnectionStatus, data)
    }

    /// Sets the chat ID.
    #[inline]
    #[must_use]
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Sets the message ID.
    #[inline]
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Serializes the message to its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a message from wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the text is not a valid
    /// message (bad JSON, missing or unknown `type`).
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
