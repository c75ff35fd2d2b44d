//! Native engine client.
//!
//! This module provides the entry point for talking to the media engine.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Engine`] | Issues commands and dispatches incoming messages |
//! | [`EngineBuilder`] | Fluent configuration builder |
//! | [`ModuleBootstrap`] | Module readiness gate |
//! | [`SharerOptions`] | `startSharer` options |
//! | [`EncodingOptions`] | `changeEncoding` options |
//! | [`PlayerOptions`] | `startUDP` options |
//!
//! # Example
//!
//! ```ignore
//! use sharer_bridge::{Engine, PlayerOptions, Result};
//!
//! # async fn example(connection: sharer_bridge::transport::Connection) -> Result<()> {
//! let engine = Engine::builder().transport(connection).build()?;
//! engine.load().await?;
//!
//! engine.start_player(PlayerOptions::new("0.0.0.0", 5004)).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Module readiness bridge.
pub mod bootstrap;

/// Fluent builder pattern for engine configuration.
pub mod builder;

/// Core engine implementation.
pub mod core;

/// Command option sets.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use bootstrap::{ModuleBootstrap, ModuleLauncher, ModuleStatus};
pub use builder::EngineBuilder;
pub use core::{Engine, LogSink};
pub use options::{EncodingOptions, PlayerOptions, SharerOptions};
