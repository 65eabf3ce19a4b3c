use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::jwt_auth;
use crate::gateway::{flush, pong, push_stream_handler, websocket_handler};
use crate::presence::{subscribe, unsubscribe};
use crate::profile::{health, update_profile};
use crate::room::{join_room, leave_room, send_message};
use crate::shared::AppState;

/// Builds the HTTP surface.
///
/// Transport endpoints authenticate through the gateway so they can answer a
/// failed handshake with an `error` event. Everything else sits behind the
/// bearer middleware.
pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/pong", post(pong))
        .route("/flush", post(flush))
        .route("/profile", put(update_profile))
        .route("/rooms/:room_id/messages", post(send_message))
        .route("/rooms/:room_id/join", post(join_room))
        .route("/rooms/:room_id/leave", post(leave_room))
        .route(
            "/users/:target/subscription",
            put(subscribe).delete(unsubscribe),
        )
        .layer(middleware::from_fn_with_state(state.clone(), jwt_auth));

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/events", get(push_stream_handler))
        .route("/health", get(health))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
