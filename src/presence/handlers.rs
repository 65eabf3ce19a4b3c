use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::auth::AuthenticatedUser;
use crate::shared::{AppError, AppState};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionResponse {
    pub target: String,
    pub subscribed: bool,
    pub changed: bool,
}

/// PUT /users/:target/subscription - receive presence updates about `target`
#[instrument(skip(state, user), fields(subscriber = %user.id()))]
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(target): Path<String>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    if target == user.id() {
        return Err(AppError::BadRequest("Cannot subscribe to yourself".to_string()));
    }
    if state.profiles.get_profile(&target).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", target)));
    }

    let changed = state.subscriptions.subscribe(&target, user.id());
    debug!(target_id = %target, changed = changed, "Subscribed to presence");
    Ok(Json(SubscriptionResponse {
        target,
        subscribed: true,
        changed,
    }))
}

/// DELETE /users/:target/subscription
#[instrument(skip(state, user), fields(subscriber = %user.id()))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(target): Path<String>,
) -> Json<SubscriptionResponse> {
    let changed = state.subscriptions.unsubscribe(&target, user.id());
    Json(SubscriptionResponse {
        target,
        subscribed: false,
        changed,
    })
}
