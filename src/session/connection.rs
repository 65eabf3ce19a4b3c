use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::events::Envelope;

/// Stable user identity as issued by the authentication collaborator
pub type UserId = String;

/// Unique identifier for a physical connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the client is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Full-duplex WebSocket
    Socket,
    /// One-directional `text/event-stream`; inbound traffic arrives over HTTP
    PushStream,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection is closed")]
    Closed,

    #[error("Connection write queue is full")]
    Backpressure,
}

/// Transport-agnostic handle owned by a [`Session`](super::Session).
///
/// `write` never blocks: it hands the envelope to the transport's driver
/// task and fails fast when the driver has fallen behind. `write_waiting`
/// waits for the driver to make room and is used to replay a backlog that may
/// be larger than the write queue.
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> &ConnectionId;

    /// Identity the connection was authenticated as
    fn identity(&self) -> &str;

    fn transport(&self) -> Transport;

    fn write(&self, envelope: &Envelope) -> Result<(), ConnectionError>;

    /// Waits up to `timeout` for queue space; a driver that stays stalled
    /// gets the connection closed
    async fn write_waiting(
        &self,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<(), ConnectionError>;

    fn close(&self);

    fn is_open(&self) -> bool;
}

/// Connection backed by a bounded channel drained by a transport driver.
///
/// Closing drops the sender, which ends the driver's receive loop. The
/// handle also reports closed once the driver drops its receiver.
pub struct ChannelConnection {
    id: ConnectionId,
    identity: UserId,
    transport: Transport,
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
}

impl ChannelConnection {
    pub fn new(
        identity: impl Into<UserId>,
        transport: Transport,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            identity: identity.into(),
            transport,
            sender: Mutex::new(Some(sender)),
        });
        (connection, receiver)
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::Sender<Envelope>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn transport(&self) -> Transport {
        self.transport
    }

    fn write(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        let result = match self.sender().as_ref() {
            Some(sender) => sender.try_send(envelope.clone()),
            None => return Err(ConnectionError::Closed),
        };

        match result {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    connection_id = %self.id,
                    identity = %self.identity,
                    "Write queue full, closing stalled connection"
                );
                self.close();
                Err(ConnectionError::Backpressure)
            }
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(ConnectionError::Closed)
            }
        }
    }

    async fn write_waiting(
        &self,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let sender = self.sender().clone();
        let Some(sender) = sender else {
            return Err(ConnectionError::Closed);
        };

        match tokio::time::timeout(timeout, sender.send(envelope.clone())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                self.close();
                Err(ConnectionError::Closed)
            }
            Err(_) => {
                warn!(
                    connection_id = %self.id,
                    identity = %self.identity,
                    timeout_ms = timeout.as_millis() as u64,
                    "Driver stalled while replaying, closing connection"
                );
                self.close();
                Err(ConnectionError::Backpressure)
            }
        }
    }

    fn close(&self) {
        self.sender().take();
    }

    fn is_open(&self) -> bool {
        self.sender()
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }
}
