use crate::crypto::Ciphertext;

use super::messages::ServerEvent;

/// A serialized, ready-to-write outbound event.
///
/// `data` is the JSON ciphertext object for everything a session sends. The
/// event name stays in the clear because push-stream events are framed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    event: String,
    data: String,
}

impl Envelope {
    pub fn sealed(event_name: &str, ciphertext: &Ciphertext) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event_name.to_string(),
            data: serde_json::to_string(ciphertext)?,
        })
    }

    /// Unencrypted envelope. Only used for connection rejections, where the
    /// peer has no usable key and nothing user-specific is carried.
    pub fn plaintext(event: &ServerEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.event_name().to_string(),
            data: serde_json::to_string(event)?,
        })
    }

    pub fn event_name(&self) -> &str {
        &self.event
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Single JSON text frame for the socket transport
    pub fn to_socket_frame(&self) -> String {
        self.data.clone()
    }
}
