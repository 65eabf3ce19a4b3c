use serde::{Deserialize, Serialize};

use crate::session::UserId;

/// A chat room and the identities currently joined to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomModel {
    pub id: String,
    pub members: Vec<UserId>,
}

impl RoomModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|member| member == user_id)
    }

    pub fn add_member(&mut self, user_id: &str) -> bool {
        if self.has_member(user_id) {
            return false;
        }
        self.members.push(user_id.to_string());
        true
    }

    pub fn remove_member(&mut self, user_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != user_id);
        self.members.len() != before
    }
}
