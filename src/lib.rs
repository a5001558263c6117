//! chatflow-ws - Resilient WebSocket chat client.
//!
//! This library keeps a single client connection to a chat endpoint alive:
//! it opens the connection, exchanges JSON [`Message`]s, and reopens the
//! connection after unexpected drops without the caller writing retry logic.
//!
//! # Architecture
//!
//! - **[`ConnectionManager`]**: owns one transport link at a time, the
//!   reconnect policy and the attempt counter
//! - **[`Transport`]**: opens links and reports their events; the default is
//!   [`WebSocketTransport`]
//! - **[`Message`]**: passive data shape, encoded as JSON text
//!
//! Key behaviour:
//!
//! - Unclean closes reconnect with linear backoff (1s, 2s, ... 5s), at most
//!   5 attempts between successful opens
//! - Clean closes and [`ConnectionManager::disconnect`] never reconnect
//! - Sends while disconnected are dropped, never queued
//! - Malformed inbound frames are logged and skipped
//!
//! # Quick Start
//!
//! ```no_run
//! use chatflow_ws::{ConnectionConfig, ConnectionManager, Message, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConnectionConfig::builder("ws://localhost:3000/ws", "flow-1")
//!         .chat_id("chat-1")
//!         .on_message(|message| println!("received: {}", message.data))
//!         .on_close(|info| println!("closed: {info}"))
//!         .build()?;
//!
//!     let manager = ConnectionManager::new(config);
//!     manager.connect().await?;
//!
//!     manager.send(&Message::user("hello").with_chat_id("chat-1"));
//!
//!     manager.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`ConnectionManager`], [`ConnectionConfig`], [`ReconnectPolicy`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | [`Message`] and its wire encoding |
//! | [`transport`] | [`Transport`] traits and the WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Connection manager and configuration.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Wire protocol message types.
pub mod protocol;

/// Transport abstraction and WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ConnectionConfig, ConnectionConfigBuilder, ConnectionManager, ConnectionState,
    ReconnectPolicy,
};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{Message, MessageType};

// Transport types
pub use transport::{
    CloseInfo, EventSender, ReadyState, Transport, TransportEvent, TransportLink,
    WebSocketTransport,
};
