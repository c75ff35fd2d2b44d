//! WebSocket connection and event loop.
//!
//! The engine connects as a WebSocket client and exchanges one JSON envelope
//! per text frame.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming text frames, handed to the installed message handler
//! - Outgoing envelopes posted through [`Transport::post_message`]
//! - Close notification once the socket ends

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

use super::{CloseHandler, MessageHandler, Transport};

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write one text frame.
    Send(String),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Handlers
// ============================================================================

/// Callbacks shared with the event loop.
#[derive(Default)]
struct Handlers {
    message: Mutex<Option<MessageHandler>>,
    close: Mutex<Option<CloseHandler>>,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the engine.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and cheap to clone; all clones share the
/// same event loop.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Callbacks (shared with event loop).
    handlers: Arc<Handlers>,
}

impl Connection {
    /// Creates a new connection from a WebSocket stream.
    ///
    /// Spawns the event loop task internally, so this must run inside a
    /// tokio runtime.
    pub fn new<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handlers = Arc::new(Handlers::default());

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&handlers),
        ));

        Self {
            command_tx,
            handlers,
        }
    }

    /// Returns `true` once the event loop has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        handlers: Arc<Handlers>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the engine
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &handlers);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by engine");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Envelopes from the bridge
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(json)) => {
                            if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                warn!(error = %e, "Failed to write envelope");
                                break;
                            }
                            trace!("Envelope sent");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        command_rx.close();

        let close = handlers.close.lock().take();
        if let Some(close) = close {
            close();
        }

        debug!("Event loop terminated");
    }

    /// Hands an incoming text frame to the message handler.
    fn handle_incoming_message(text: &str, handlers: &Handlers) {
        let handler = handlers.message.lock().clone();
        match handler {
            Some(handler) => handler(text),
            None => warn!(text = %text, "No message handler installed, dropping frame"),
        }
    }
}

impl Transport for Connection {
    fn post_message(&self, message: String) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Send(message))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handlers.message.lock() = Some(handler);
    }

    fn set_close_handler(&self, handler: CloseHandler) {
        *self.handlers.close.lock() = Some(handler);
    }

    fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }
}

// ============================================================================
// Tests
// ============================================================================
