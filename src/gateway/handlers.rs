use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::auth::AuthenticatedUser;
use crate::shared::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct PongRequest {
    pub ping: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PongResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FlushResponse {
    pub flushed: bool,
}

/// POST /pong - heartbeat answer for push-stream clients
#[instrument(skip(state, user), fields(identity = %user.id()))]
pub async fn pong(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<PongRequest>,
) -> Result<Json<PongResponse>, AppError> {
    let session = state
        .registry
        .get(user.id())
        .ok_or_else(|| AppError::NotFound("No session for user".to_string()))?;

    let accepted = session.pong(request.ping).await;
    debug!(ping = request.ping, accepted = accepted, "Pong received");
    Ok(Json(PongResponse { accepted }))
}

/// POST /flush - delivers the caller's backlog to its live connections.
///
/// Clients call this after receiving `connect`.
#[instrument(skip(state, user), fields(identity = %user.id()))]
pub async fn flush(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<FlushResponse> {
    let flushed = state.registry.flush(user.id()).await;
    Json(FlushResponse { flushed })
}
