//! Sharer Bridge - async command correlation for a native media engine.
//!
//! This library turns a fire-and-forget, single-channel message transport
//! into awaitable per-command futures, and manages the lifecycle of the
//! engine's *sharers* (outbound media shares).
//!
//! # Architecture
//!
//! The bridge follows a request/reply model over one shared conduit:
//!
//! - **Bridge (Rust)**: Issues commands tagged with a correlation id
//! - **Engine (native)**: Answers each command once, emits log lines
//!
//! Key design principles:
//!
//! - Each [`Engine`] owns its registry, transport and module readiness
//! - Only the registry writes correlation ids onto the transport
//! - Replies are matched by id, never by arrival order
//! - Stopping is two-phase: engine acknowledgment, then track "ended"
//!
//! # Quick Start
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! use sharer_bridge::transport::PendingServer;
//! use sharer_bridge::{Engine, MediaStream, Result, SharerOptions, VideoTrack};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Wait for the native engine to connect
//!     let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
//!     let connection = server.accept().await?;
//!
//!     let engine = Engine::builder().transport(connection).build()?;
//!     let sharer = engine
//!         .create_sharer(SharerOptions::to_host("192.168.1.20"))
//!         .await?;
//!
//!     // Share a captured track, then stop
//!     let stream = MediaStream::new(vec![VideoTrack::new("screen")]);
//!     sharer.attach_stream(stream).await?;
//!
//!     let finished = sharer.stop().await?;
//!     finished.await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | Engine client, builder, module bootstrap and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`media`] | Streams, tracks and capture providers |
//! | [`protocol`] | Wire envelopes and commands |
//! | [`registry`] | Command correlation registry |
//! | [`sharer`] | Sharer lifecycle |
//! | [`transport`] | Transport trait and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Native engine client.
///
/// Use [`Engine::builder()`] to create a configured engine instance.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Capture-side media model.
pub mod media;

/// Engine protocol message types.
pub mod protocol;

/// Command correlation registry.
pub mod registry;

/// Sharer lifecycle management.
pub mod sharer;

/// Transport layer to the native engine.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use engine::{
    EncodingOptions, Engine, EngineBuilder, ModuleBootstrap, ModuleStatus, PlayerOptions,
    SharerOptions,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, SharerId, StreamId, TrackId};

// Media types
pub use media::{CaptureConstraints, CaptureProvider, CaptureSource, MediaStream, VideoTrack};

// Registry types
pub use registry::{CommandRegistry, PendingReply};

// Sharer types
pub use sharer::{OnStopped, Sharer, SharerState, StopCompletion};

// Transport types
pub use transport::Transport;
