use async_stream::stream;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::credentials::bearer_token;
use super::gateway::{OpenedConnection, Rejection};
use crate::events::Envelope;
use crate::session::{ChannelConnection, Connection, Session, Transport};
use crate::shared::AppState;

fn to_event(envelope: &Envelope) -> Event {
    Event::default()
        .event(envelope.event_name())
        .data(envelope.data())
}

/// Detaches the push connection when the response body is dropped, which is
/// how a client hang-up surfaces for this transport
struct DetachOnDrop {
    session: Arc<Session>,
    connection: Arc<ChannelConnection>,
}

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        self.connection.close();

        let session = Arc::clone(&self.session);
        let connection_id = self.connection.id().clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    session.detach(&connection_id).await;
                });
            }
            Err(_) => warn!(
                connection_id = %connection_id,
                "No runtime to detach push stream on"
            ),
        }
    }
}

/// Rejections still answer with an event stream so EventSource-style
/// clients can read the `error` event
fn rejection_response(rejection: &Rejection) -> Response {
    let status = match rejection {
        Rejection::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Rejection::UnknownKey(_) => StatusCode::FORBIDDEN,
        Rejection::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    let envelope = match rejection.to_envelope() {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Failed to serialize rejection");
            return status.into_response();
        }
    };

    let stream = futures::stream::once(async move { Ok::<_, Infallible>(to_event(&envelope)) });
    (status, Sse::new(stream)).into_response()
}

/// Push-stream endpoint. GET /events with `Authorization: Bearer <token>`.
/// Client-to-server traffic for this transport goes through POST /pong and
/// POST /flush.
pub async fn push_stream_handler(headers: HeaderMap, State(state): State<AppState>) -> Response {
    let identity = match state.gateway.admit(bearer_token(&headers)).await {
        Ok(identity) => identity,
        Err(rejection) => return rejection_response(&rejection),
    };

    let OpenedConnection {
        session,
        connection,
        mut outbound,
    } = match state.gateway.open(&identity, Transport::PushStream).await {
        Ok(opened) => opened,
        Err(e) => return e.into_response(),
    };

    info!(identity = %identity, "Push stream established");

    let guard = DetachOnDrop {
        session,
        connection,
    };
    let stream = stream! {
        let _guard = guard;
        while let Some(envelope) = outbound.recv().await {
            yield Ok::<_, Infallible>(to_event(&envelope));
        }
        debug!(identity = %identity, "Push stream closed by session");
    };

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}
