//! Command correlation registry.
//!
//! Turns the fire-and-forget transport into awaitable per-command replies.
//! Every issued command gets a fresh [`CommandId`] and a pending entry; the
//! first reply carrying that id settles the entry and removes it, so a
//! command settles exactly once.
//!
//! # Lifecycle of an entry
//!
//! ```text
//! issue() ──► pending[id] ──► deliver(id) ──► removed
//!                  │
//!                  ├──► cancel(id) ──► removed (reply future: ConnectionClosed)
//!                  └──► fail_pending() ──► removed (reply future: ConnectionClosed)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, to_string};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Command, Request, Response};
use crate::transport::Transport;

// ============================================================================
// Types
// ============================================================================

/// A command waiting for its reply.
struct PendingCommand {
    /// Command name, used to label remote failures.
    command: &'static str,
    /// Continuation settled by the reply.
    reply_tx: oneshot::Sender<Result<Value>>,
}

/// Map of correlation ids to pending commands.
type PendingMap = FxHashMap<CommandId, PendingCommand>;

// ============================================================================
// CommandRegistry
// ============================================================================

/// Correlates outbound commands with engine replies.
///
/// Only the registry writes correlation ids onto the transport.
pub struct CommandRegistry {
    /// Next correlation id to hand out.
    next_id: AtomicU64,
    /// Commands waiting for a reply.
    pending: Mutex<PendingMap>,
    /// Wire to the engine.
    transport: Arc<dyn Transport>,
}

impl CommandRegistry {
    /// Creates an empty registry writing to `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Mutex::new(PendingMap::default()),
            transport,
        }
    }

    /// Issues a command and returns a future for its reply.
    ///
    /// The id is allocated, the entry stored and the envelope posted before
    /// this returns; the future only waits. A transport failure settles the
    /// future immediately with that error.
    pub fn issue(&self, command: &Command) -> PendingReply {
        let command_id = CommandId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = command.name();
        let (reply_tx, reply_rx) = oneshot::channel();
        let reply = PendingReply {
            command_id,
            command: name,
            reply_rx,
        };

        let json = match to_string(&Request::new(command_id, command)) {
            Ok(json) => json,
            Err(e) => {
                let _ = reply_tx.send(Err(Error::Json(e)));
                return reply;
            }
        };

        // Store correlation before sending
        self.pending.lock().insert(
            command_id,
            PendingCommand {
                command: name,
                reply_tx,
            },
        );

        if let Err(e) = self.transport.post_message(json) {
            debug!(%command_id, command = name, error = %e, "Failed to post command");
            if let Some(pending) = self.pending.lock().remove(&command_id) {
                let _ = pending.reply_tx.send(Err(e));
            }
            return reply;
        }

        trace!(%command_id, command = name, "Command issued");
        reply
    }

    /// Settles the pending command matching `response.cmd_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if no command is pending under that id
    /// (unknown, already settled, or cancelled). Registry state is untouched.
    pub fn deliver(&self, response: Response) -> Result<()> {
        let command_id = response.cmd_id;
        let Some(pending) = self.pending.lock().remove(&command_id) else {
            return Err(Error::protocol(format!(
                "can't handle message id: {command_id}"
            )));
        };

        let success = response.success;
        let result = response.into_result(pending.command);
        if pending.reply_tx.send(result).is_err() {
            debug!(%command_id, command = pending.command, "Reply arrived for abandoned command");
        }

        trace!(%command_id, command = pending.command, success, "Command settled");
        Ok(())
    }

    /// Drops the pending entry for `command_id`.
    ///
    /// Returns `true` if an entry was removed. Its reply future resolves
    /// with [`Error::ConnectionClosed`].
    pub fn cancel(&self, command_id: CommandId) -> bool {
        let removed = self.pending.lock().remove(&command_id).is_some();
        if removed {
            debug!(%command_id, "Removed pending command");
        }
        removed
    }

    /// Fails every pending command with [`Error::ConnectionClosed`].
    pub fn fail_pending(&self) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        let count = pending.len();

        for (_, entry) in pending {
            let _ = entry.reply_tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands");
        }
    }

    /// Returns the number of commands waiting for a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if `command_id` is waiting for a reply.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, command_id: CommandId) -> bool {
        self.pending.lock().contains_key(&command_id)
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// Future resolving to the engine's reply payload.
///
/// Dropping it does not remove the pending entry; a later reply is simply
/// discarded.
#[must_use = "the reply is lost unless awaited"]
#[derive(Debug)]
pub struct PendingReply {
    command_id: CommandId,
    command: &'static str,
    reply_rx: oneshot::Receiver<Result<Value>>,
}

impl PendingReply {
    /// Correlation id of the command.
    #[inline]
    #[must_use]
    pub const fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Wire name of the command.
    #[inline]
    #[must_use]
    pub const fn command(&self) -> &'static str {
        self.command
    }
}

impl Future for PendingReply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.reply_rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
