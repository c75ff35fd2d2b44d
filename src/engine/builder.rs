//! Builder pattern for engine configuration.
//!
//! Provides a fluent API for configuring and creating [`Engine`] instances.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sharer_bridge::Engine;
//! use sharer_bridge::transport::ChannelTransport;
//!
//! let (transport, _peer) = ChannelTransport::pair();
//! let engine = Engine::builder()
//!     .transport(transport)
//!     .command_timeout(Duration::from_secs(5))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Transport;

use super::bootstrap::{ModuleBootstrap, ModuleLauncher};
use super::core::{Engine, LogSink};

// ============================================================================
// EngineBuilder
// ============================================================================

/// Builder for configuring an [`Engine`] instance.
///
/// Use [`Engine::builder()`] to create a new builder.
#[derive(Default)]
pub struct EngineBuilder {
    /// Wire to the native engine.
    transport: Option<Arc<dyn Transport>>,
    /// Receives `{log}` lines from the engine.
    log_sink: Option<LogSink>,
    /// Creates the engine module on first load.
    module_launcher: Option<ModuleLauncher>,
    /// Upper bound on waiting for a command reply.
    command_timeout: Option<Duration>,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("has_transport", &self.transport.is_some())
            .field("has_log_sink", &self.log_sink.is_some())
            .field("has_module_launcher", &self.module_launcher.is_some())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

// ============================================================================
// EngineBuilder Implementation
// ============================================================================

impl EngineBuilder {
    /// Creates a new engine builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport to the native engine.
    #[inline]
    #[must_use]
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets a shared transport to the native engine.
    #[inline]
    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the sink for engine log lines.
    ///
    /// Defaults to `tracing::info!` under the `sharer_bridge::engine` target.
    #[inline]
    #[must_use]
    pub fn log_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    /// Sets the closure that creates the engine module.
    ///
    /// Without a launcher the module is considered loaded as soon as the
    /// engine is built.
    #[inline]
    #[must_use]
    pub fn module_launcher(
        mut self,
        launcher: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.module_launcher = Some(Box::new(launcher));
        self
    }

    /// Bounds how long a command waits for its reply.
    ///
    /// By default commands wait indefinitely.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Builds the engine with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport is set
    /// - [`Error::Config`] if the command timeout is zero
    pub fn build(self) -> Result<Engine> {
        let transport = self.validate_transport()?;
        let command_timeout = self.validate_timeout()?;

        let bootstrap = match self.module_launcher {
            Some(launcher) => ModuleBootstrap::new(launcher),
            None => ModuleBootstrap::loaded(),
        };

        Ok(Engine::new(transport, bootstrap, self.log_sink, command_timeout))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl EngineBuilder {
    /// Validates the transport configuration.
    fn validate_transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport.clone().ok_or_else(|| {
            Error::config(
                "Transport is required. Use .transport() to set it.\n\
                 Example: Engine::builder().transport(connection)",
            )
        })
    }

    /// Validates the command timeout.
    fn validate_timeout(&self) -> Result<Option<Duration>> {
        match self.command_timeout {
            Some(timeout) if timeout.is_zero() => {
                Err(Error::config("Command timeout must be greater than zero"))
            }
            timeout => Ok(timeout),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::ModuleStatus;
    use crate::transport::ChannelTransport;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = EngineBuilder::new();
        assert!(builder.transport.is_none());
        assert!(builder.log_sink.is_none());
        assert!(builder.module_launcher.is_none());
        assert!(builder.command_timeout.is_none());
    }

    #[test]
    fn test_build_without_transport_fails() {
        let err = EngineBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Transport is required"));
    }

    #[test]
    fn test_build_with_zero_timeout_fails() {
        let (transport, _peer) = ChannelTransport::pair();
        let err = EngineBuilder::new()
            .transport(transport)
            .command_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_without_launcher_is_loaded() {
        let (transport, _peer) = ChannelTransport::pair();
        let engine = EngineBuilder::new()
            .transport(transport)
            .build()
            .expect("valid config");
        assert!(engine.bootstrap().is_loaded());
    }

    #[test]
    fn test_build_with_launcher_starts_absent() {
        let (transport, _peer) = ChannelTransport::pair();
        let engine = EngineBuilder::new()
            .transport(transport)
            .module_launcher(|| Ok(()))
            .build()
            .expect("valid config");
        assert_eq!(engine.bootstrap().status(), ModuleStatus::Absent);
    }

    #[test]
    fn test_debug_hides_closures() {
        let builder = EngineBuilder::new().command_timeout(Duration::from_secs(1));
        let debug = format!("{builder:?}");
        assert!(debug.contains("has_transport: false"));
        assert!(debug.contains("command_timeout: Some(1s)"));
    }
}
