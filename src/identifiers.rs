//! Type-safe identifiers for engine entities.
//!
//! Newtype wrappers keep correlation ids, sharer ids and media ids from
//! being mixed up at compile time.
//!
//! | Type | Assigned by | Wire shape |
//! |------|-------------|------------|
//! | [`CommandId`] | [`CommandRegistry`](crate::registry::CommandRegistry) | integer |
//! | [`SharerId`] | the engine, on `startSharer` | integer or string |
//! | [`StreamId`] | the capture provider | string |
//! | [`TrackId`] | the capture provider | string |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CommandId
// ============================================================================

/// Correlation id pairing an outbound command with its reply.
///
/// Allocated from a per-registry monotonic counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Wraps a raw correlation id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SharerId
// ============================================================================

/// Engine-assigned sharer handle.
///
/// The engine is free to hand out integers or strings; the id is echoed back
/// in the same shape on every sharer command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SharerId {
    /// Integer id.
    Number(u64),
    /// String id.
    Name(String),
}

impl From<u64> for SharerId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for SharerId {
    fn from(id: &str) -> Self {
        Self::Name(id.to_string())
    }
}

impl From<String> for SharerId {
    fn from(id: String) -> Self {
        Self::Name(id)
    }
}

impl fmt::Display for SharerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Name(id) => f.write_str(id),
        }
    }
}

// ============================================================================
// StreamId / TrackId
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing id.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random id.
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the id as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a captured media stream.
    StreamId
);

string_id!(
    /// Identifier of a single media track.
    TrackId
);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_serializes_as_integer() {
        let json = serde_json::to_string(&CommandId::new(7)).expect("serialize");
        assert_eq!(json, "7");
    }

    #[test]
    fn test_sharer_id_accepts_number_and_string() {
        let numeric: SharerId = serde_json::from_str("4").expect("parse");
        let named: SharerId = serde_json::from_str(r#""S1""#).expect("parse");

        assert_eq!(numeric, SharerId::Number(4));
        assert_eq!(named, SharerId::from("S1"));
        assert_eq!(serde_json::to_string(&numeric).expect("serialize"), "4");
        assert_eq!(serde_json::to_string(&named).expect("serialize"), r#""S1""#);
    }

    #[test]
    fn test_generated_track_ids_differ() {
        assert_ne!(TrackId::generate(), TrackId::generate());
        assert_eq!(TrackId::new("video-0").as_str(), "video-0");
    }
}
