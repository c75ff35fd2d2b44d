//! Transport layer to the native engine.
//!
//! The engine is reached through a single fire-and-forget send primitive and
//! a single incoming-message callback. Request/response pairing is built
//! above this layer by the [`CommandRegistry`](crate::registry::CommandRegistry).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Engine (Rust)  │    post_message(json)        │  Native media   │
//! │                 │─────────────────────────────►│  engine         │
//! │  Registry       │                              │                 │
//! │  + dispatcher   │◄─────────────────────────────│                 │
//! │                 │    MessageHandler(json)      │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | In-process transport pair |
//! | `connection` | WebSocket connection and event loop |
//! | `server` | WebSocket server binding and acceptance |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport pair.
pub mod channel;

/// WebSocket connection and event loop.
pub mod connection;

/// WebSocket server the engine connects to.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelPeer, ChannelTransport};
pub use connection::Connection;
pub use server::PendingServer;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked for every raw message received from the engine.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked once when the transport closes.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// Transport
// ============================================================================

/// The sole two-way conduit to the engine.
///
/// Implementations own no domain state, only the wire.
pub trait Transport: Send + Sync {
    /// Sends one serialized envelope without waiting for any reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the wire is gone.
    fn post_message(&self, message: String) -> Result<()>;

    /// Installs the incoming-message callback, replacing any previous one.
    fn set_message_handler(&self, handler: MessageHandler);

    /// Installs the close callback.
    fn set_close_handler(&self, _handler: CloseHandler) {}

    /// Closes the wire.
    fn shutdown(&self) {}
}
