use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::{ClientEvent, Envelope};
use crate::session::Session;

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text frame to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Receive the next text frame from the client (None if connection closed)
    async fn receive_message(&mut self) -> Result<Option<String>, SocketError>;

    async fn close(&mut self) -> Result<(), SocketError>;
}

/// Handler for inbound client frames
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, identity: &str, message: String);
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Socket send failed: {0}")]
    SendFailed(String),

    #[error("Socket receive failed: {0}")]
    ReceiveFailed(String),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Protocol-level ping/pong and binary frames carry nothing for us
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// Routes inbound client events to the connection's session
pub struct ClientEventHandler {
    session: Arc<Session>,
}

impl ClientEventHandler {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl MessageHandler for ClientEventHandler {
    async fn handle_message(&self, identity: &str, message: String) {
        match serde_json::from_str::<ClientEvent>(&message) {
            Ok(ClientEvent::Pong(payload)) => {
                self.session.pong(payload.ping).await;
            }
            Ok(ClientEvent::Flush) => {
                let flushed = self.session.flush().await;
                debug!(identity = %identity, flushed = flushed, "Flush requested over socket");
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to parse client event");
            }
        }
    }
}

/// Drives one socket: writes queued envelopes out and hands inbound frames
/// to the message handler, until either side closes
pub struct SocketDriver {
    identity: String,
    socket: Box<dyn SocketWrapper>,
    outbound: mpsc::Receiver<Envelope>,
    handler: Arc<dyn MessageHandler>,
}

impl SocketDriver {
    pub fn new(
        identity: String,
        socket: Box<dyn SocketWrapper>,
        outbound: mpsc::Receiver<Envelope>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            identity,
            socket,
            outbound,
            handler,
        }
    }

    /// Run the connection - handles both sending and receiving until disconnect
    pub async fn run(mut self) -> Result<(), SocketError> {
        loop {
            tokio::select! {
                envelope = self.outbound.recv() => {
                    match envelope {
                        Some(envelope) => {
                            self.socket.send_message(envelope.to_socket_frame()).await?
                        }
                        // Session closed the handle
                        None => break,
                    }
                }

                frame = self.socket.receive_message() => {
                    match frame {
                        Ok(Some(message)) => {
                            self.handler.handle_message(&self.identity, message).await;
                        }
                        Ok(None) => break,
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        let _ = self.socket.close().await;
        Ok(())
    }
}
