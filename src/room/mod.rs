// Public API - what other modules can use
pub use directory::{InMemoryRoomDirectory, JoinRoomResult, LeaveRoomResult, RoomDirectory};
pub use fanout::{FanoutReport, RoomFanout};
pub use handlers::{join_room, leave_room, send_message};
pub use models::RoomModel;

// Internal modules
mod directory;
mod fanout;
mod handlers;
mod models;
