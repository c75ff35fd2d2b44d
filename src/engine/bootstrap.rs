//! Engine module readiness.
//!
//! Wraps the module's "loaded" / "error" signals in a future. The first
//! [`ModuleBootstrap::load`] creates the module through the configured
//! launcher; later calls only wait for the same readiness signal.
//!
//! ```text
//! Absent ──load()──► Loading ──module_loaded()──► Loaded
//!                       │
//!                       └──module_error()──► Failed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Creates the engine module.
///
/// Called at most once per engine. Completion is reported later through
/// [`ModuleBootstrap::module_loaded`] or [`ModuleBootstrap::module_error`].
pub type ModuleLauncher = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Readiness of the engine module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    /// No module handle exists yet.
    Absent,
    /// Module created, waiting for a signal.
    Loading,
    /// Module is ready for commands.
    Loaded,
    /// Module reported an error.
    Failed(String),
}

impl ModuleStatus {
    /// Returns `true` once a terminal signal has fired.
    #[inline]
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Loaded | Self::Failed(_))
    }
}

// ============================================================================
// ModuleBootstrap
// ============================================================================

/// Readiness gate for one engine module.
pub struct ModuleBootstrap {
    /// Current status, observed by every `load()` future.
    status: watch::Sender<ModuleStatus>,
    /// Creates the module on first load.
    launcher: Option<ModuleLauncher>,
}

impl fmt::Debug for ModuleBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBootstrap")
            .field("status", &*self.status.borrow())
            .field("has_launcher", &self.launcher.is_some())
            .finish()
    }
}

impl ModuleBootstrap {
    /// Creates a bootstrap whose module is created by `launcher`.
    #[must_use]
    pub fn new(launcher: ModuleLauncher) -> Self {
        Self {
            status: watch::Sender::new(ModuleStatus::Absent),
            launcher: Some(launcher),
        }
    }

    /// Creates a bootstrap for a module that is already live.
    #[must_use]
    pub fn loaded() -> Self {
        Self {
            status: watch::Sender::new(ModuleStatus::Loaded),
            launcher: None,
        }
    }

    /// Loads the module, or waits for the load already in progress.
    ///
    /// The launcher runs synchronously on the first call; the returned future
    /// only waits for the readiness signal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleLoad`] if the launcher fails or the module
    /// reports an error. A failed module stays failed.
    pub fn load(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let mut rx = self.status.subscribe();

        let mut created = false;
        self.status.send_if_modified(|status| {
            if *status == ModuleStatus::Absent {
                *status = ModuleStatus::Loading;
                created = true;
            }
            created
        });

        if created {
            debug!("Creating engine module");
            if let Some(launcher) = &self.launcher
                && let Err(e) = launcher()
            {
                self.module_error(e.to_string());
            }
        } else {
            debug!("Engine module already created, waiting for readiness");
        }

        async move {
            let status = rx
                .wait_for(ModuleStatus::is_settled)
                .await
                .map(|status| status.clone())
                .map_err(|_| Error::module_load("bootstrap dropped before readiness"))?;

            match status {
                ModuleStatus::Failed(reason) => Err(Error::module_load(reason)),
                _ => Ok(()),
            }
        }
    }

    /// Signals that the module finished loading.
    pub fn module_loaded(&self) {
        info!("Engine module loaded");
        self.status.send_replace(ModuleStatus::Loaded);
    }

    /// Signals that the module failed to load.
    pub fn module_error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "Engine module failed to load");
        self.status.send_replace(ModuleStatus::Failed(reason));
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ModuleStatus {
        self.status.borrow().clone()
    }

    /// Returns `true` if the module is ready for commands.
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        *self.status.borrow() == ModuleStatus::Loaded
    }
}

// ============================================================================
// Tests
// ============================================================================
