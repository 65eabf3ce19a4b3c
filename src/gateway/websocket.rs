use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::credentials::{connection_token, PROTOCOL_MARKER};
use super::gateway::Rejection;
use super::socket::{ClientEventHandler, SocketDriver, SocketWrapper};
use crate::session::{Connection, Transport, UserId};
use crate::shared::AppState;

/// WebSocket endpoint. GET /ws with the token either in the Authorization
/// header or as the `Authorization, <token>` pair in Sec-WebSocket-Protocol.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let admission = state.gateway.admit(connection_token(&headers)).await;

    ws.protocols([PROTOCOL_MARKER])
        .on_upgrade(move |socket| handle_websocket_connection(socket, admission, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    mut socket: WebSocket,
    admission: Result<UserId, Rejection>,
    state: AppState,
) {
    let identity = match admission {
        Ok(identity) => identity,
        Err(rejection) => {
            reject(&mut socket, &rejection).await;
            return;
        }
    };

    let opened = match state.gateway.open(&identity, Transport::Socket).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!(identity = %identity, error = %e, "Failed to open socket connection");
            let _ = SocketWrapper::close(&mut socket).await;
            return;
        }
    };

    info!(identity = %identity, "WebSocket connection established");

    let handler = Arc::new(ClientEventHandler::new(Arc::clone(&opened.session)));
    let driver = SocketDriver::new(identity.clone(), Box::new(socket), opened.outbound, handler);

    match driver.run().await {
        Ok(()) => info!(identity = %identity, "WebSocket connection closed cleanly"),
        Err(e) => warn!(identity = %identity, error = %e, "WebSocket connection error"),
    }

    opened.connection.close();
    opened.session.detach(opened.connection.id()).await;
}

async fn reject(socket: &mut WebSocket, rejection: &Rejection) {
    warn!(reason = %rejection, "Rejecting WebSocket connection");

    match rejection.to_envelope() {
        Ok(envelope) => {
            if let Err(e) = socket.send_message(envelope.to_socket_frame()).await {
                warn!(error = %e, "Failed to send rejection");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize rejection"),
    }
    let _ = SocketWrapper::close(socket).await;
}
