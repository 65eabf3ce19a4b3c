// Public API - what other modules can use
pub use credentials::{bearer_token, connection_token, protocol_token, PROTOCOL_MARKER};
pub use gateway::{ConnectionGateway, OpenedConnection, Rejection};
pub use handlers::{flush, pong, FlushResponse, PongResponse};
pub use push_stream::push_stream_handler;
pub use socket::{ClientEventHandler, MessageHandler, SocketDriver, SocketError, SocketWrapper};
pub use websocket::websocket_handler;

// Internal modules
mod credentials;
#[allow(clippy::module_inception)]
mod gateway;
mod handlers;
mod push_stream;
mod socket;
mod websocket;
