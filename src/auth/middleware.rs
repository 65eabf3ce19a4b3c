use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use super::types::AuthenticatedUser;
use crate::gateway::bearer_token;
use crate::shared::{AppError, AppState};

/// JWT authentication middleware - validates the Authorization Bearer header
/// and adds the caller's identity to the request.
/// Handlers can then extract `Extension(user): Extension<AuthenticatedUser>`.
#[instrument(skip(state, req, next), fields(uri = %req.uri()))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        warn!("Missing or malformed Authorization header");
        AppError::Unauthorized("Missing authorization header".to_string())
    })?;

    let user_id = match state.authenticator.authenticate(token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("JWT authentication failed: {}", e);
            return Err(AppError::Unauthorized(e.to_string()));
        }
    };

    debug!(user_id = %user_id, "Authentication successful");
    req.extensions_mut().insert(AuthenticatedUser(user_id));

    Ok(next.run(req).await)
}
