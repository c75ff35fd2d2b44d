//! In-process transport pair.
//!
//! [`ChannelTransport`] is handed to the engine; the matching [`ChannelPeer`]
//! plays the native side: it reads outbound envelopes and pushes replies or
//! log lines back through the installed message handler.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{Error, Result};

use super::{CloseHandler, MessageHandler, Transport};

// ============================================================================
// Types
// ============================================================================

/// Handlers shared between both ends of the pair.
#[derive(Default)]
struct Handlers {
    message: Mutex<Option<MessageHandler>>,
    close: Mutex<Option<CloseHandler>>,
}

// ============================================================================
// ChannelTransport
// ============================================================================

/// Bridge-side end of an in-process transport.
pub struct ChannelTransport {
    /// Outbound envelopes.
    outgoing: mpsc::UnboundedSender<String>,
    /// Callbacks installed by the engine.
    handlers: Arc<Handlers>,
}

impl ChannelTransport {
    /// Creates a connected transport/peer pair.
    #[must_use]
    pub fn pair() -> (Self, ChannelPeer) {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let handlers = Arc::new(Handlers::default());

        let transport = Self {
            outgoing,
            handlers: Arc::clone(&handlers),
        };
        let peer = ChannelPeer {
            outgoing: outgoing_rx,
            handlers,
        };

        (transport, peer)
    }
}

impl Transport for ChannelTransport {
    fn post_message(&self, message: String) -> Result<()> {
        self.outgoing
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handlers.message.lock() = Some(handler);
    }

    fn set_close_handler(&self, handler: CloseHandler) {
        *self.handlers.close.lock() = Some(handler);
    }
}

// ============================================================================
// ChannelPeer
// ============================================================================

/// Engine-side end of an in-process transport.
///
/// Dropping the peer closes the transport.
pub struct ChannelPeer {
    /// Envelopes posted by the bridge.
    outgoing: mpsc::UnboundedReceiver<String>,
    /// Callbacks installed by the engine.
    handlers: Arc<Handlers>,
}

impl ChannelPeer {
    /// Returns the next outbound envelope if one is queued.
    ///
    /// Envelopes that are not valid JSON are returned as JSON strings.
    pub fn try_next_request(&mut self) -> Option<Value> {
        self.outgoing.try_recv().ok().map(|text| Self::decode(&text))
    }

    /// Waits for the next outbound envelope.
    ///
    /// Returns `None` once the bridge side is dropped.
    pub async fn next_request(&mut self) -> Option<Value> {
        self.outgoing.recv().await.map(|text| Self::decode(&text))
    }

    /// Delivers a raw message to the bridge.
    pub fn send(&self, message: &str) {
        let handler = self.handlers.message.lock().clone();
        match handler {
            Some(handler) => {
                trace!(len = message.len(), "Delivering message to bridge");
                handler(message);
            }
            None => warn!("No message handler installed, dropping message"),
        }
    }

    /// Delivers a reply envelope for `cmd_id`.
    pub fn reply(&self, cmd_id: u64, success: bool, payload: Value) {
        let envelope = json!({
            "cmd_id": cmd_id,
            "success": success,
            "payload": payload,
        });
        self.send(&envelope.to_string());
    }

    /// Delivers an unsolicited log line.
    pub fn log(&self, line: &str) {
        self.send(&json!({ "log": line }).to_string());
    }

    fn decode(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

impl Drop for ChannelPeer {
    fn drop(&mut self) {
        let handler = self.handlers.close.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
