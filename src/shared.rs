use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::Authenticator;
use crate::config::SessionConfig;
use crate::crypto::EciesEncryptor;
use crate::gateway::ConnectionGateway;
use crate::presence::{PresenceTracker, SubscriptionIndex};
use crate::profile::ProfileStore;
use crate::room::{RoomDirectory, RoomFanout};
use crate::session::{PresenceReceiver, SessionContext, SessionRegistry};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub gateway: Arc<ConnectionGateway>,
    pub fanout: Arc<RoomFanout>,
    pub subscriptions: Arc<SubscriptionIndex>,
    pub profiles: Arc<dyn ProfileStore>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Wires the distribution core around the given collaborators.
    ///
    /// The returned receiver carries session presence transitions and must be
    /// handed to [`PresenceTracker::start`].
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        rooms: Arc<dyn RoomDirectory>,
        authenticator: Arc<dyn Authenticator>,
        config: SessionConfig,
    ) -> (Self, PresenceReceiver) {
        let (transitions, receiver) = mpsc::unbounded_channel();
        let queue_capacity = config.connection_queue_capacity;

        let context = Arc::new(SessionContext {
            profiles: Arc::clone(&profiles),
            encryptor: Arc::new(EciesEncryptor::new()),
            config,
            transitions,
        });
        let registry = Arc::new(SessionRegistry::new(context));

        let state = Self {
            gateway: Arc::new(ConnectionGateway::new(
                Arc::clone(&authenticator),
                Arc::clone(&profiles),
                Arc::clone(&registry),
                queue_capacity,
            )),
            fanout: Arc::new(RoomFanout::new(Arc::clone(&registry), Arc::clone(&rooms))),
            subscriptions: Arc::new(SubscriptionIndex::new()),
            registry,
            profiles,
            rooms,
            authenticator,
        };
        (state, receiver)
    }

    pub fn presence_tracker(&self) -> PresenceTracker {
        PresenceTracker::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.profiles),
            Arc::clone(&self.rooms),
            Arc::clone(&self.subscriptions),
        )
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Collaborator error: {0}")]
    CollaboratorError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::JwtError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::CollaboratorError(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("Collaborator error: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
