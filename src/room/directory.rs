use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::models::RoomModel;
use crate::session::UserId;
use crate::shared::AppError;

/// Result of attempting to join a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRoomResult {
    /// Joined the room, returns updated room data
    Joined(RoomModel),
    /// Identity was already a member
    AlreadyMember,
}

/// Result of attempting to leave a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveRoomResult {
    /// Left the room, returns updated room data
    Left(RoomModel),
    NotMember,
    RoomNotFound,
}

/// Room membership collaborator
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Members of the room, or None when the room does not exist
    async fn get_room_members(&self, room_id: &str) -> Result<Option<Vec<UserId>>, AppError>;

    /// Adds the identity to the room, creating the room if needed
    async fn try_join_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<JoinRoomResult, AppError>;

    async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<LeaveRoomResult, AppError>;

    /// Rooms the identity is currently a member of
    async fn get_user_rooms(&self, user_id: &str) -> Result<Vec<String>, AppError>;

    /// Union of the members of every room the identity belongs to.
    ///
    /// A room that cannot be read is skipped so one failure doesn't hide the
    /// rest of the audience.
    async fn get_user_views(&self, user_id: &str) -> HashSet<UserId> {
        let room_ids = match self.get_user_rooms(user_id).await {
            Ok(room_ids) => room_ids,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to resolve rooms for viewers");
                return HashSet::new();
            }
        };

        let mut viewers = HashSet::new();
        for room_id in &room_ids {
            match self.get_room_members(room_id).await {
                Ok(Some(members)) => viewers.extend(members),
                Ok(None) => debug!(room_id = %room_id, "Room not found while resolving viewers"),
                Err(e) => warn!(
                    room_id = %room_id,
                    error = %e,
                    "Failed to read room members, skipping room"
                ),
            }
        }
        viewers
    }
}

/// In-memory implementation of RoomDirectory for development and testing
pub struct InMemoryRoomDirectory {
    rooms: Mutex<HashMap<String, RoomModel>>,
}

impl Default for InMemoryRoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a directory with pre-populated rooms
    pub fn with_rooms(rooms: Vec<RoomModel>) -> Self {
        let rooms = rooms
            .into_iter()
            .map(|room| (room.id.clone(), room))
            .collect();

        Self {
            rooms: Mutex::new(rooms),
        }
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn get_room_members(&self, room_id: &str) -> Result<Option<Vec<UserId>>, AppError> {
        let rooms = self.rooms.lock().await;
        Ok(rooms.get(room_id).map(|room| room.members.clone()))
    }

    async fn get_user_rooms(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let rooms = self.rooms.lock().await;
        let mut room_ids: Vec<String> = rooms
            .values()
            .filter(|room| room.has_member(user_id))
            .map(|room| room.id.clone())
            .collect();
        room_ids.sort();
        Ok(room_ids)
    }

    #[instrument(skip(self))]
    async fn try_join_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<JoinRoomResult, AppError> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| {
            info!(room_id = %room_id, "Creating room on first join");
            RoomModel::new(room_id)
        });

        if !room.add_member(user_id) {
            debug!(room_id = %room_id, user_id = %user_id, "Already a member");
            return Ok(JoinRoomResult::AlreadyMember);
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            members = room.members.len(),
            "Joined room"
        );
        Ok(JoinRoomResult::Joined(room.clone()))
    }

    #[instrument(skip(self))]
    async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<LeaveRoomResult, AppError> {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get_mut(room_id) else {
            debug!(room_id = %room_id, "Room not found");
            return Ok(LeaveRoomResult::RoomNotFound);
        };

        if !room.remove_member(user_id) {
            debug!(room_id = %room_id, user_id = %user_id, "Not a member");
            return Ok(LeaveRoomResult::NotMember);
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            members = room.members.len(),
            "Left room"
        );
        Ok(LeaveRoomResult::Left(room.clone()))
    }
}
