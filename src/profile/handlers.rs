use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::models::Profile;
use crate::auth::AuthenticatedUser;
use crate::crypto::decode_public_key;
use crate::shared::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub color: String,
    /// Base64 SEC1 secp256k1 public key
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub online: usize,
}

/// HTTP handler for registering the caller's display data and public key
///
/// PUT /profile
#[instrument(skip(state, user, request), fields(user_id = %user.id()))]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    if request.username.trim().is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }
    decode_public_key(&request.public_key)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let profile = state
        .profiles
        .upsert_profile(user.id(), &request.username, &request.color, &request.public_key)
        .await?;

    info!(username = %profile.username, "Profile updated");
    Ok(Json(profile))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.registry.len(),
        online: state.registry.online_count().await,
    })
}
