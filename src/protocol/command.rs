//! Command definitions understood by the engine.
//!
//! Each command maps to one `cmd` name and one payload shape. Numeric
//! options travel as decimal strings, which is how the engine parses them.
//!
//! | Command | Payload |
//! |---------|---------|
//! | `startSharer` | `{ip, bitrate, fps, port}` |
//! | `setSharerTracks` | `{sharer_id, video_track}` |
//! | `stopSharer` | `{sharer_id}` |
//! | `changeEncoding` | `{sharer_id, bitrate, fps}` |
//! | `startUDP` | `{ip, port}` |
//! | `stopReceiver` | `null` |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::engine::{EncodingOptions, PlayerOptions, SharerOptions};
use crate::identifiers::{SharerId, TrackId};

// ============================================================================
// Command
// ============================================================================

/// All commands the correlation layer can issue.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a sharer on the engine.
    StartSharer(SharerOptions),

    /// Hand a capture track to an existing sharer.
    SetSharerTracks {
        /// Target sharer.
        sharer_id: SharerId,
        /// Track to encode and send.
        video_track: TrackId,
    },

    /// Stop a sharer's outbound stream.
    StopSharer {
        /// Target sharer.
        sharer_id: SharerId,
    },

    /// Reconfigure a sharer's encoder.
    ChangeEncoding {
        /// Target sharer.
        sharer_id: SharerId,
        /// New encoder settings.
        encoding: EncodingOptions,
    },

    /// Start the UDP receiver / player.
    StartUdp(PlayerOptions),

    /// Stop the receiver / player.
    StopReceiver,
}

impl Command {
    /// Returns the wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartSharer(_) => "startSharer",
            Self::SetSharerTracks { .. } => "setSharerTracks",
            Self::StopSharer { .. } => "stopSharer",
            Self::ChangeEncoding { .. } => "changeEncoding",
            Self::StartUdp(_) => "startUDP",
            Self::StopReceiver => "stopReceiver",
        }
    }

    /// Builds the command payload.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::StartSharer(options) => json!({
                "ip": options.ip,
                "bitrate": options.bitrate.to_string(),
                "fps": options.fps.to_string(),
                "port": options.port.to_string(),
            }),
            Self::SetSharerTracks {
                sharer_id,
                video_track,
            } => json!({
                "sharer_id": sharer_id,
                "video_track": video_track,
            }),
            Self::StopSharer { sharer_id } => json!({ "sharer_id": sharer_id }),
            Self::ChangeEncoding {
                sharer_id,
                encoding,
            } => json!({
                "sharer_id": sharer_id,
                "bitrate": encoding.bitrate.to_string(),
                "fps": encoding.fps.to_string(),
            }),
            Self::StartUdp(options) => json!({
                "ip": options.ip,
                "port": options.port.to_string(),
            }),
            Self::StopReceiver => Value::Null,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_sharer_payload_uses_strings() {
        let command = Command::StartSharer(SharerOptions::new("127.0.0.1", 1000, 30, 5004));

        assert_eq!(command.name(), "startSharer");
        assert_eq!(
            command.payload(),
            json!({"ip": "127.0.0.1", "bitrate": "1000", "fps": "30", "port": "5004"})
        );
    }

    #[test]
    fn test_sharer_commands_echo_id_shape() {
        let command = Command::StopSharer {
            sharer_id: SharerId::Number(2),
        };
        assert_eq!(command.payload(), json!({"sharer_id": 2}));

        let command = Command::SetSharerTracks {
            sharer_id: SharerId::from("S1"),
            video_track: TrackId::new("cam-0"),
        };
        assert_eq!(
            command.payload(),
            json!({"sharer_id": "S1", "video_track": "cam-0"})
        );
    }

    #[test]
    fn test_change_encoding_payload() {
        let command = Command::ChangeEncoding {
            sharer_id: SharerId::from("S1"),
            encoding: EncodingOptions::new(2500, 60),
        };
        assert_eq!(command.name(), "changeEncoding");
        assert_eq!(
            command.payload(),
            json!({"sharer_id": "S1", "bitrate": "2500", "fps": "60"})
        );
    }

    #[test]
    fn test_player_commands() {
        let start = Command::StartUdp(PlayerOptions::new("0.0.0.0", 5004));
        assert_eq!(start.name(), "startUDP");
        assert_eq!(start.payload(), json!({"ip": "0.0.0.0", "port": "5004"}));

        assert_eq!(Command::StopReceiver.name(), "stopReceiver");
        assert!(Command::StopReceiver.payload().is_null());
    }
}
