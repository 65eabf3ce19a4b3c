#![allow(dead_code)] // Test utilities may not all be used in every test

use async_trait::async_trait;
use std::collections::HashSet;

use roomcast::{
    profile::{InMemoryProfileStore, Profile, ProfileStore},
    room::{InMemoryRoomDirectory, JoinRoomResult, LeaveRoomResult, RoomDirectory},
    session::UserId,
    AppError,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Room directory whose reads fail for selected rooms
pub struct FlakyRoomDirectory {
    inner: InMemoryRoomDirectory,
    broken: HashSet<String>,
}

impl FlakyRoomDirectory {
    pub fn new(inner: InMemoryRoomDirectory, broken: HashSet<String>) -> Self {
        Self { inner, broken }
    }
}

#[async_trait]
impl RoomDirectory for FlakyRoomDirectory {
    async fn get_room_members(&self, room_id: &str) -> Result<Option<Vec<UserId>>, AppError> {
        if self.broken.contains(room_id) {
            return Err(AppError::CollaboratorError(format!("{} unavailable", room_id)));
        }
        self.inner.get_room_members(room_id).await
    }

    async fn try_join_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<JoinRoomResult, AppError> {
        self.inner.try_join_room(room_id, user_id).await
    }

    async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<LeaveRoomResult, AppError> {
        self.inner.leave_room(room_id, user_id).await
    }

    async fn get_user_rooms(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        self.inner.get_user_rooms(user_id).await
    }
}

/// Profile store whose key lookups fail for selected users
pub struct FlakyProfileStore {
    inner: InMemoryProfileStore,
    broken_keys: HashSet<String>,
}

impl FlakyProfileStore {
    pub fn new(inner: InMemoryProfileStore, broken_keys: HashSet<String>) -> Self {
        Self { inner, broken_keys }
    }
}

#[async_trait]
impl ProfileStore for FlakyProfileStore {
    async fn get_public_key(&self, user_id: &str) -> Result<Option<String>, AppError> {
        if self.broken_keys.contains(user_id) {
            return Err(AppError::CollaboratorError("key service down".to_string()));
        }
        self.inner.get_public_key(user_id).await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        self.inner.get_profile(user_id).await
    }

    async fn set_online_status(&self, user_id: &str, online: bool) -> Result<bool, AppError> {
        self.inner.set_online_status(user_id, online).await
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        username: &str,
        color: &str,
        public_key: &str,
    ) -> Result<Profile, AppError> {
        self.inner
            .upsert_profile(user_id, username, color, public_key)
            .await
    }
}
