use serde::{Deserialize, Serialize};

/// A user's profile as seen by the distribution core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub color: String,
    /// Last persisted presence status
    pub online: bool,
    /// Base64 SEC1 public key used to encrypt everything sent to this user
    pub public_key: Option<String>,
}

impl Profile {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            color: color.into(),
            online: false,
            public_key: None,
        }
    }

    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }
}
