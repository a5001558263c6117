//! Connection manager and its configuration.
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionConfig::builder` - Endpoint, chatflow ID, callbacks
//! 2. `ConnectionManager::new` - Wraps the config, no I/O yet
//! 3. `ConnectionManager::connect` - Opens the first link
//! 4. `ConnectionManager::send` - Fire-and-forget messages while open
//! 5. Unclean close - Linear-backoff reconnects, reported via callbacks
//! 6. `ConnectionManager::disconnect` - Closes the link, cancels reconnects
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent configuration builder |
//! | `config` | Configuration, callbacks, reconnect policy |
//! | `core` | `ConnectionManager` and its state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Builder for [`ConnectionConfig`].
pub mod builder;

/// Configuration types.
pub mod config;

/// Connection manager.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::builder::ConnectionConfigBuilder;
pub use self::config::{
    CloseHandler, ConnectionConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
    ErrorHandler, MessageHandler, OpenHandler, ReconnectPolicy,
};
pub use self::core::{ConnectionManager, ConnectionState};
