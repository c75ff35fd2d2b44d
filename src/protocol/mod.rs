//! Engine protocol message types.
//!
//! This module defines the envelope format exchanged with the native
//! media engine.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Bridge → Engine | Command with correlation id |
//! | `Response` | Engine → Bridge | Success/failure for one `cmd_id` |
//! | `Incoming::Log` | Engine → Bridge | Unsolicited log line |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command names and payload shapes |
//! | `message` | Request, Response and Incoming envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Command names and payloads.
pub mod command;

/// Request and reply envelopes.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use message::{Incoming, Request, Response};
