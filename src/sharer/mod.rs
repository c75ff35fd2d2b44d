//! Sharer lifecycle management.
//!
//! A [`Sharer`] represents one outbound media share on the engine. It
//! attaches capture streams, stops them in two phases (engine teardown, then
//! local hardware teardown) and notifies stop waiters.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Sharer`] handle and its engine commands |
//! | `lifecycle` | State machine, stop waiters and completion futures |

// ============================================================================
// Submodules
// ============================================================================

/// Sharer handle and lifecycle operations.
pub mod core;

/// Sharer state machine.
pub mod lifecycle;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Sharer;
pub use lifecycle::{OnStopped, SharerState, StopCompletion};
