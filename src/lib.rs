// Library crate for the roomcast event distribution server
// This file exposes the public API for the binary and integration tests

pub mod auth;
pub mod config;
pub mod crypto;
pub mod events;
pub mod gateway;
pub mod presence;
pub mod profile;
pub mod room;
pub mod routes;
pub mod session;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use config::{HeartbeatConfig, ServerConfig, SessionConfig};
pub use events::{ClientEvent, Envelope, ServerEvent};
pub use gateway::ConnectionGateway;
pub use presence::{PresenceTracker, SubscriptionIndex};
pub use room::{RoomDirectory, RoomFanout};
pub use routes::router;
pub use session::{Session, SessionRegistry};
pub use shared::{AppError, AppState};
