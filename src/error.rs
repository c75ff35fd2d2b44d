//! Error types for the sharer bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use sharer_bridge::{Result, Sharer};
//!
//! async fn restart(sharer: &Sharer) -> Result<()> {
//!     let finished = sharer.stop().await?;
//!     finished.await;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Protocol | [`Error::Protocol`] |
//! | Lifecycle | [`Error::InvalidState`], [`Error::InvalidInput`] |
//! | Engine | [`Error::RemoteFailure`], [`Error::ModuleLoad`], [`Error::ModuleNotLoaded`] |
//! | Capture | [`Error::Capture`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::identifiers::CommandId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every failure surfaces to the immediate caller; none of them leaves the
/// engine or a sharer unusable.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unmatched message from the engine.
    ///
    /// The message is dropped; no state changes.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation is not valid for the sharer's current state.
    ///
    /// Returned before any message reaches the engine.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the state conflict.
        message: String,
    },

    /// Caller supplied an unusable stream or option set.
    ///
    /// Returned before any message reaches the engine.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid input.
        message: String,
    },

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// The engine explicitly reported failure for a command.
    #[error("Engine rejected {command}: {payload}")]
    RemoteFailure {
        /// Command name that failed.
        command: String,
        /// Payload the engine attached to the failure.
        payload: Value,
    },

    /// The engine module failed to load.
    #[error("Module failed to load: {reason}")]
    ModuleLoad {
        /// Reason reported by the module error signal.
        reason: String,
    },

    /// An engine command was issued before the module finished loading.
    #[error("Module not loaded")]
    ModuleNotLoaded,

    // ========================================================================
    // Capture Errors
    // ========================================================================
    /// The media-capture provider could not produce a stream.
    #[error("Capture failed: {name}: {message}")]
    Capture {
        /// Capture error name (e.g. `NotAllowedError`).
        name: String,
        /// Human readable detail.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timeout waiting for the engine to connect.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Transport closed while commands were in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A command reply did not arrive within the configured timeout.
    #[error("Command {command_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command that timed out.
        command_id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    #[inline]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a remote failure error.
    #[inline]
    pub fn remote_failure(command: impl Into<String>, payload: Value) -> Self {
        Self::RemoteFailure {
            command: command.into(),
            payload,
        }
    }

    /// Creates a module load error.
    #[inline]
    pub fn module_load(reason: impl Into<String>) -> Self {
        Self::ModuleLoad {
            reason: reason.into(),
        }
    }

    /// Creates a capture error.
    #[inline]
    pub fn capture(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capture {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(waited: Duration) -> Self {
        Self::ConnectionTimeout {
            timeout_ms: saturating_millis(waited),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(command_id: CommandId, waited: Duration) -> Self {
        Self::RequestTimeout {
            command_id,
            timeout_ms: saturating_millis(waited),
        }
    }
}

/// Whole milliseconds in `duration`, clamped to `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the engine reported this failure.
    #[inline]
    #[must_use]
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::RemoteFailure { .. })
    }

    /// Returns `true` if this error was raised locally before any traffic.
    #[inline]
    #[must_use]
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::InvalidInput { .. } | Self::ModuleNotLoaded
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_state("already sharing");
        assert_eq!(err.to_string(), "Invalid state: already sharing");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("transport is required");
        assert_eq!(err.to_string(), "Configuration error: transport is required");
    }

    #[test]
    fn test_remote_failure_display() {
        let err = Error::remote_failure("stopSharer", json!({"reason": "busy"}));
        assert_eq!(
            err.to_string(),
            r#"Engine rejected stopSharer: {"reason":"busy"}"#
        );
        assert!(err.is_remote_failure());
    }

    #[test]
    fn test_capture_display() {
        let err = Error::capture("NotAllowedError", "permission denied");
        assert_eq!(
            err.to_string(),
            "Capture failed: NotAllowedError: permission denied"
        );
    }

    #[test]
    fn test_is_state_error() {
        assert!(Error::invalid_state("x").is_state_error());
        assert!(Error::invalid_input("x").is_state_error());
        assert!(Error::ModuleNotLoaded.is_state_error());
        assert!(!Error::protocol("x").is_state_error());
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(CommandId::new(3), Duration::from_millis(500));
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
        assert_eq!(timeout_err.to_string(), "Command 3 timed out after 500ms");
    }

    #[test]
    fn test_timeout_millis_saturate() {
        match Error::connection_timeout(Duration::MAX) {
            Error::ConnectionTimeout { timeout_ms } => assert_eq!(timeout_ms, u64::MAX),
            other => panic!("unexpected error: {other:?}"),
        }
        match Error::request_timeout(CommandId::new(1), Duration::from_micros(1500)) {
            Error::RequestTimeout { timeout_ms, .. } => assert_eq!(timeout_ms, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(Duration::from_secs(1)).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::invalid_input("test").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
