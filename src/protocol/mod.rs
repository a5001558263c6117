//! Wire protocol message types.
//!
//! Messages travel as UTF-8 JSON text frames in both directions.
//!
//! | Type | Typical direction |
//! |------|-------------------|
//! | `message` | Either |
//! | `user_message` | Local → Remote |
//! | `bot_message` | Remote → Local |
//! | `error` | Remote → Local |
//! | `connection_status` | Remote → Local |
//!
//! The direction column is convention only; nothing here enforces it.

// ============================================================================
// Submodules
// ============================================================================

/// Message record and JSON encoding.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Message, MessageType};
