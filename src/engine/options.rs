//! Option sets for engine commands.
//!
//! The option structs are plain data with `serde` support so callers can
//! persist them between sessions. Each one validates itself before any
//! command is issued.
//!
//! # Example
//!
//! ```ignore
//! use sharer_bridge::SharerOptions;
//!
//! let options = SharerOptions::new("192.168.1.20", 1000, 30, 5004)
//!     .with_bitrate(2500)
//!     .with_fps(60);
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default UDP port for the media stream.
pub const DEFAULT_PORT: u16 = 5004;

/// Default encoder bitrate in kbit/s.
pub const DEFAULT_BITRATE: u32 = 1000;

/// Default encoder frame rate.
pub const DEFAULT_FPS: u32 = 30;

/// Highest frame rate the encoder accepts.
pub const MAX_FPS: u32 = 120;

// ============================================================================
// SharerOptions
// ============================================================================

/// Options for creating a sharer (`startSharer`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharerOptions {
    /// Receiver address.
    pub ip: String,

    /// Initial encoder bitrate in kbit/s.
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    /// Initial encoder frame rate.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Receiver UDP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl SharerOptions {
    /// Creates sharer options.
    #[inline]
    #[must_use]
    pub fn new(ip: impl Into<String>, bitrate: u32, fps: u32, port: u16) -> Self {
        Self {
            ip: ip.into(),
            bitrate,
            fps,
            port,
        }
    }

    /// Creates options for `ip` with default bitrate, frame rate and port.
    #[inline]
    #[must_use]
    pub fn to_host(ip: impl Into<String>) -> Self {
        Self::new(ip, DEFAULT_BITRATE, DEFAULT_FPS, DEFAULT_PORT)
    }

    /// Sets the bitrate.
    #[inline]
    #[must_use]
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Sets the frame rate.
    #[inline]
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Sets the receiver port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Returns the encoder part of these options.
    #[inline]
    #[must_use]
    pub fn encoding(&self) -> EncodingOptions {
        EncodingOptions::new(self.bitrate, self.fps)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unparsable address, a zero port
    /// or an invalid encoding.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.ip, self.port)?;
        self.encoding().validate()
    }
}

// ============================================================================
// EncodingOptions
// ============================================================================

/// Encoder settings (`changeEncoding`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingOptions {
    /// Bitrate in kbit/s.
    pub bitrate: u32,
    /// Frames per second.
    pub fps: u32,
}

impl EncodingOptions {
    /// Creates encoder settings.
    #[inline]
    #[must_use]
    pub const fn new(bitrate: u32, fps: u32) -> Self {
        Self { bitrate, fps }
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero bitrate or a frame rate
    /// outside `1..=MAX_FPS`.
    pub fn validate(&self) -> Result<()> {
        if self.bitrate == 0 {
            return Err(Error::invalid_input("bitrate must be greater than zero"));
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(Error::invalid_input(format!(
                "fps must be between 1 and {MAX_FPS}, got {}",
                self.fps
            )));
        }
        Ok(())
    }
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BITRATE, DEFAULT_FPS)
    }
}

// ============================================================================
// PlayerOptions
// ============================================================================

/// Options for starting the receiver (`startUDP`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerOptions {
    /// Address to listen on.
    pub ip: String,
    /// UDP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl PlayerOptions {
    /// Creates player options.
    #[inline]
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unparsable address or a zero
    /// port.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.ip, self.port)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_endpoint(ip: &str, port: u16) -> Result<()> {
    if ip.parse::<IpAddr>().is_err() {
        return Err(Error::invalid_input(format!("invalid ip address: {ip:?}")));
    }
    if port == 0 {
        return Err(Error::invalid_input("port must be greater than zero"));
    }
    Ok(())
}

const fn default_bitrate() -> u32 {
    DEFAULT_BITRATE
}

const fn default_fps() -> u32 {
    DEFAULT_FPS
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

// ============================================================================
// Tests
// ============================================================================
