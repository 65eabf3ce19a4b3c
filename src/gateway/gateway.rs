use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::auth::Authenticator;
use crate::events::{Envelope, RejectionCode, ServerEvent};
use crate::profile::ProfileStore;
use crate::session::{
    ChannelConnection, Connection, Session, SessionRegistry, Transport, UserId,
};
use crate::shared::AppError;

/// Why a connection was refused before attaching to a session
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("No public key registered for {0}")]
    UnknownKey(UserId),

    #[error("Profile lookup failed: {0}")]
    Unavailable(String),
}

impl Rejection {
    /// Plaintext `error` envelope sent to the peer before closing
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let code = match self {
            Rejection::Unauthorized(_) | Rejection::Unavailable(_) => RejectionCode::Unauthorized,
            Rejection::UnknownKey(_) => RejectionCode::UnknownKey,
        };
        Envelope::plaintext(&ServerEvent::rejection(code, self.to_string()))
    }
}

/// A connection that passed admission and is attached to its session
pub struct OpenedConnection {
    pub session: Arc<Session>,
    pub connection: Arc<ChannelConnection>,
    /// Drained by the transport driver
    pub outbound: mpsc::Receiver<Envelope>,
}

/// Entry point for new transport connections: authenticates, checks the
/// encryption key, attaches to the session, and greets the client.
pub struct ConnectionGateway {
    authenticator: Arc<dyn Authenticator>,
    profiles: Arc<dyn ProfileStore>,
    registry: Arc<SessionRegistry>,
    queue_capacity: usize,
}

impl ConnectionGateway {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        profiles: Arc<dyn ProfileStore>,
        registry: Arc<SessionRegistry>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            authenticator,
            profiles,
            registry,
            queue_capacity,
        }
    }

    /// Verifies the credential and that the identity can receive encrypted
    /// events. Nothing is attached on failure.
    #[instrument(skip(self, token))]
    pub async fn admit(&self, token: Option<&str>) -> Result<UserId, Rejection> {
        let token = token.ok_or_else(|| {
            warn!("Connection attempt without credential");
            Rejection::Unauthorized("Missing authentication token".to_string())
        })?;

        let identity = self.authenticator.authenticate(token).await.map_err(|e| {
            warn!(error = %e, "Connection credential rejected");
            Rejection::Unauthorized(e.to_string())
        })?;

        match self.profiles.get_public_key(&identity).await {
            Ok(Some(_)) => Ok(identity),
            Ok(None) => {
                warn!(identity = %identity, "Connection rejected, no public key registered");
                Err(Rejection::UnknownKey(identity))
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Public key lookup failed");
                Err(Rejection::Unavailable(e.to_string()))
            }
        }
    }

    /// Attaches a new connection for an admitted identity and sends `connect`.
    ///
    /// `connect` goes out only after the attach completes, so a client that
    /// waits for it before flushing can't race its own registration.
    #[instrument(skip(self))]
    pub async fn open(
        &self,
        identity: &str,
        transport: Transport,
    ) -> Result<OpenedConnection, AppError> {
        let (connection, outbound) =
            ChannelConnection::new(identity, transport, self.queue_capacity);
        let session = self.registry.get_or_create(identity);

        session
            .attach(connection.clone())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        if let Err(e) = session.send(&ServerEvent::connect()).await {
            warn!(identity = %identity, error = %e, "Failed to send connect event");
        }

        info!(
            identity = %identity,
            transport = ?transport,
            connection_id = %connection.id(),
            "Connection opened"
        );

        Ok(OpenedConnection {
            session,
            connection,
            outbound,
        })
    }
}
