pub use connection::{
    ChannelConnection, Connection, ConnectionError, ConnectionId, Transport, UserId,
};
pub use registry::SessionRegistry;
pub use session::{
    Delivery, PresenceReceiver, PresenceSender, PresenceTransition, SendError, Session,
    SessionContext, SessionError,
};

mod connection;
mod heartbeat;
mod registry;
#[allow(clippy::module_inception)]
mod session;
