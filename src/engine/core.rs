//! Engine client and incoming-message dispatcher.
//!
//! The [`Engine`] owns the command registry, the transport and the module
//! bootstrap for one native engine instance. It is the only reader of the
//! transport: every incoming message passes through
//! [`Engine::handle_message`].
//!
//! # Example
//!
//! ```ignore
//! use sharer_bridge::{Engine, SharerOptions};
//!
//! let engine = Engine::builder().transport(connection).build()?;
//! let sharer = engine
//!     .create_sharer(SharerOptions::to_host("192.168.1.20"))
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SharerId;
use crate::protocol::{Command, Incoming};
use crate::registry::CommandRegistry;
use crate::sharer::Sharer;
use crate::transport::Transport;

use super::bootstrap::ModuleBootstrap;
use super::builder::EngineBuilder;
use super::options::{PlayerOptions, SharerOptions};

// ============================================================================
// Types
// ============================================================================

/// Receives unsolicited `{log}` lines from the engine.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Internal shared state for the engine.
pub(crate) struct EngineInner {
    /// Pending command table.
    registry: CommandRegistry,
    /// Wire to the engine.
    transport: Arc<dyn Transport>,
    /// Module readiness.
    bootstrap: ModuleBootstrap,
    /// Destination for engine log lines.
    log_sink: LogSink,
    /// Upper bound on waiting for a reply, if any.
    command_timeout: Option<Duration>,
}

impl EngineInner {
    /// Dispatches one raw message from the engine.
    fn handle_message(&self, text: &str) {
        let incoming = match Incoming::parse(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(error = %e, "Dropping malformed engine message");
                return;
            }
        };

        match incoming {
            Incoming::Log(line) => (self.log_sink)(&line),
            Incoming::Response(response) => {
                if let Err(e) = self.registry.deliver(response) {
                    warn!(error = %e, "Dropping engine reply");
                }
            }
        }
    }

    /// Fails in-flight commands once the wire is gone.
    fn handle_close(&self) {
        let pending = self.registry.pending_count();
        warn!(pending, "Engine transport closed");
        self.registry.fail_pending();
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Handle to one native media engine.
///
/// Cheap to clone; all clones share the same registry and transport.
#[derive(Clone)]
pub struct Engine {
    /// Shared inner state.
    pub(crate) inner: Arc<EngineInner>,
}

// ============================================================================
// Engine - Display
// ============================================================================

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("module", &self.inner.bootstrap.status())
            .field("pending_commands", &self.pending_commands())
            .field("command_timeout", &self.inner.command_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Engine - Construction
// ============================================================================

impl Engine {
    /// Creates a configuration builder for the engine.
    #[inline]
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Wires a validated configuration into a live engine.
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        bootstrap: ModuleBootstrap,
        log_sink: Option<LogSink>,
        command_timeout: Option<Duration>,
    ) -> Self {
        let log_sink: LogSink = match log_sink {
            Some(sink) => sink,
            None => Arc::new(|line: &str| info!(target: "sharer_bridge::engine", "{line}")),
        };

        let inner = Arc::new(EngineInner {
            registry: CommandRegistry::new(Arc::clone(&transport)),
            transport: Arc::clone(&transport),
            bootstrap,
            log_sink,
            command_timeout,
        });

        let weak = Arc::downgrade(&inner);
        transport.set_message_handler(Arc::new(move |text: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_message(text);
            }
        }));

        let weak = Arc::downgrade(&inner);
        transport.set_close_handler(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_close();
            }
        }));

        debug!(?command_timeout, "Engine created");
        Self { inner }
    }
}

// ============================================================================
// Engine - Public API
// ============================================================================

impl Engine {
    /// Creates a sharer on the engine (`startSharer`).
    ///
    /// Validation, the module check and the send happen before this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `options` fail validation
    /// - [`Error::ModuleNotLoaded`] if the module is not ready
    /// - [`Error::RemoteFailure`] if the engine refuses
    /// - [`Error::Protocol`] if the reply carries no usable `sharer_id`
    pub fn create_sharer(
        &self,
        options: SharerOptions,
    ) -> impl Future<Output = Result<Sharer>> + Send + 'static {
        let engine = self.clone();
        let reply = options
            .validate()
            .and_then(|()| self.request(Command::StartSharer(options)));

        async move {
            let payload = reply?.await?;
            let sharer_id = parse_sharer_id(&payload)?;
            info!(%sharer_id, "Sharer created");
            Ok(Sharer::new(sharer_id, engine))
        }
    }

    /// Starts the UDP receiver (`startUDP`).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `options` fail validation
    /// - [`Error::ModuleNotLoaded`] if the module is not ready
    /// - [`Error::RemoteFailure`] if the engine refuses
    pub fn start_player(
        &self,
        options: PlayerOptions,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let reply = options
            .validate()
            .and_then(|()| self.request(Command::StartUdp(options)));

        async move {
            reply?.await?;
            info!("Player started");
            Ok(())
        }
    }

    /// Stops the UDP receiver (`stopReceiver`).
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotLoaded`] if the module is not ready
    /// - [`Error::RemoteFailure`] if the engine refuses
    pub fn stop_player(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let reply = self.request(Command::StopReceiver);

        async move {
            reply?.await?;
            info!("Player stopped");
            Ok(())
        }
    }

    /// Loads the engine module, or waits for the load in progress.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleLoad`] if the module fails to load.
    pub fn load(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.inner.bootstrap.load()
    }

    /// Returns the module bootstrap, used to deliver readiness signals.
    #[inline]
    #[must_use]
    pub fn bootstrap(&self) -> &ModuleBootstrap {
        &self.inner.bootstrap
    }

    /// Feeds one raw message from the engine into the dispatcher.
    ///
    /// Transports call this through the installed message handler; hosts
    /// that receive messages out of band can call it directly.
    pub fn handle_message(&self, text: &str) {
        self.inner.handle_message(text);
    }

    /// Returns the number of commands waiting for a reply.
    #[inline]
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.inner.registry.pending_count()
    }

    /// Closes the transport and fails every in-flight command.
    pub fn shutdown(&self) {
        info!("Shutting down engine");
        self.inner.transport.shutdown();
        self.inner.registry.fail_pending();
    }
}

// ============================================================================
// Engine - Internal
// ============================================================================

impl Engine {
    /// Issues a correlated command.
    ///
    /// The command is on the wire when this returns `Ok`; the future only
    /// waits for the reply.
    pub(crate) fn request(
        &self,
        command: Command,
    ) -> Result<impl Future<Output = Result<Value>> + Send + 'static> {
        self.ensure_loaded()?;

        let reply = self.inner.registry.issue(&command);
        let command_timeout = self.inner.command_timeout;
        let inner = Arc::downgrade(&self.inner);

        Ok(async move {
            let Some(limit) = command_timeout else {
                return reply.await;
            };

            let command_id = reply.command_id();
            match tokio::time::timeout(limit, reply).await {
                Ok(result) => result,
                Err(_) => {
                    if let Some(inner) = Weak::upgrade(&inner) {
                        inner.registry.cancel(command_id);
                    }
                    warn!(%command_id, ?limit, "Command timed out");
                    Err(Error::request_timeout(command_id, limit))
                }
            }
        })
    }

    /// Issues a command without waiting for its reply.
    pub(crate) fn notify(&self, command: Command) {
        if let Err(e) = self.ensure_loaded() {
            warn!(command = command.name(), error = %e, "Dropping notification");
            return;
        }

        let reply = self.inner.registry.issue(&command);
        debug!(command_id = %reply.command_id(), command = reply.command(), "Notification sent");
        drop(reply);
    }

    /// Rejects commands until the module is ready.
    fn ensure_loaded(&self) -> Result<()> {
        if self.inner.bootstrap.is_loaded() {
            Ok(())
        } else {
            Err(Error::ModuleNotLoaded)
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts the engine-assigned id from a `startSharer` reply.
fn parse_sharer_id(payload: &Value) -> Result<SharerId> {
    match payload.get("sharer_id") {
        None | Some(Value::Null) => Err(Error::protocol("startSharer reply without sharer_id")),
        Some(id) => SharerId::deserialize(id)
            .map_err(|_| Error::protocol(format!("invalid sharer_id: {id}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================
