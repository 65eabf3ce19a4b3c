// Public API
pub use envelope::Envelope;
pub use messages::{
    Author, ClientEvent, ConnectPayload, MemberState, MessagePayload, PingPayload,
    RejectionCode, RejectionPayload, ServerEvent, UpdateMemberPayload, UpdateUserPayload,
    UserSnapshot,
};

// Internal modules
mod envelope;
mod messages;
