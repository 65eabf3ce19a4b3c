use axum::http::{header, HeaderMap};

/// Marker that precedes the token in the sub-protocol list
pub const PROTOCOL_MARKER: &str = "Authorization";

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Token carried as the `(Authorization, <token>)` pair in
/// `Sec-WebSocket-Protocol`, for clients that can't set headers on upgrade
pub fn protocol_token(headers: &HeaderMap) -> Option<&str> {
    let offered = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())?;

    let mut protocols = offered.split(',').map(str::trim);
    protocols.find(|protocol| *protocol == PROTOCOL_MARKER)?;
    protocols.next().filter(|token| !token.is_empty())
}

/// Header credential first, then the sub-protocol pair
pub fn connection_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| protocol_token(headers))
}
