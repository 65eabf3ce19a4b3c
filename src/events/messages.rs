use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

use crate::profile::Profile;

/// Events pushed from the server to a client.
///
/// Serializes as `{"event": "<name>", "payload": {...}}`, which is the
/// plaintext that gets encrypted for each recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, AsRefStr)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ServerEvent {
    Connect(ConnectPayload),
    Ping(PingPayload),
    Message(MessagePayload),
    UpdateMember(UpdateMemberPayload),
    UpdateUser(UpdateUserPayload),
    /// Connection rejection. Sent in plaintext, never attached to a session.
    Error(RejectionPayload),
}

/// Events a client sends over the socket (or the equivalent HTTP routes)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    Pong(PingPayload),
    Flush,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectPayload {
    pub opened: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PingPayload {
    pub ping: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub id: String,
    pub username: String,
    pub color: String,
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub author: Author,
    pub room: String,
    pub content: String,
    pub attachments: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    Join,
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateMemberPayload {
    pub room: String,
    pub username: String,
    pub timestamp: i64,
    pub state: MemberState,
}

/// Presence snapshot of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSnapshot {
    pub username: String,
    pub color: String,
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateUserPayload {
    pub id: String,
    pub username: String,
    pub data: UserSnapshot,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RejectionCode {
    Unauthorized,
    UnknownKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectionPayload {
    pub code: RejectionCode,
    pub message: String,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl ServerEvent {
    /// Wire name of the event, used for push-stream framing
    pub fn event_name(&self) -> &str {
        self.as_ref()
    }

    pub fn connect() -> Self {
        Self::Connect(ConnectPayload { opened: true })
    }

    pub fn ping(ping: u64) -> Self {
        Self::Ping(PingPayload { ping })
    }

    pub fn message(
        author: &Profile,
        online: bool,
        room: &str,
        content: String,
        attachments: Vec<String>,
    ) -> Self {
        Self::Message(MessagePayload {
            author: Author {
                id: author.id.clone(),
                username: author.username.clone(),
                color: author.color.clone(),
                offline: !online,
            },
            room: room.to_string(),
            content,
            attachments,
            timestamp: now_millis(),
        })
    }

    pub fn update_member(room: &str, username: &str, state: MemberState) -> Self {
        Self::UpdateMember(UpdateMemberPayload {
            room: room.to_string(),
            username: username.to_string(),
            timestamp: now_millis(),
            state,
        })
    }

    pub fn update_user(profile: &Profile, online: bool) -> Self {
        Self::UpdateUser(UpdateUserPayload {
            id: profile.id.clone(),
            username: profile.username.clone(),
            data: UserSnapshot {
                username: profile.username.clone(),
                color: profile.color.clone(),
                offline: !online,
            },
            timestamp: now_millis(),
        })
    }

    pub fn rejection(code: RejectionCode, message: impl Into<String>) -> Self {
        Self::Error(RejectionPayload {
            code,
            message: message.into(),
        })
    }
}
