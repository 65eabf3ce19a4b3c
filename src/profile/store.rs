use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::models::Profile;
use crate::shared::AppError;

/// Profile collaborator consumed by the distribution core.
///
/// User persistence lives outside this crate; the core only needs to read
/// keys and profiles and to persist presence.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Current public key of the user, if one is registered
    async fn get_public_key(&self, user_id: &str) -> Result<Option<String>, AppError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError>;

    /// Persists the online flag. Returns false when the user is unknown.
    async fn set_online_status(&self, user_id: &str, online: bool) -> Result<bool, AppError>;

    /// Creates the profile or updates its display data and public key
    async fn upsert_profile(
        &self,
        user_id: &str,
        username: &str,
        color: &str,
        public_key: &str,
    ) -> Result<Profile, AppError>;
}

/// In-memory implementation of ProfileStore for development and testing
///
/// Data is lost when the process restarts.
pub struct InMemoryProfileStore {
    profiles: Arc<RwLock<HashMap<String, Profile>>>,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a store with pre-populated profiles
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        let profile_map = profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();

        Self {
            profiles: Arc::new(RwLock::new(profile_map)),
        }
    }

    pub async fn insert(&self, profile: Profile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_public_key(&self, user_id: &str) -> Result<Option<String>, AppError> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .get(user_id)
            .and_then(|profile| profile.public_key.clone()))
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    #[instrument(skip(self))]
    async fn set_online_status(&self, user_id: &str, online: bool) -> Result<bool, AppError> {
        let mut profiles = self.profiles.write().await;
        match profiles.get_mut(user_id) {
            Some(profile) => {
                profile.online = online;
                debug!(user_id = %user_id, online = online, "Online status persisted");
                Ok(true)
            }
            None => {
                warn!(user_id = %user_id, "Cannot persist online status for unknown user");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self, public_key))]
    async fn upsert_profile(
        &self,
        user_id: &str,
        username: &str,
        color: &str,
        public_key: &str,
    ) -> Result<Profile, AppError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| Profile::new(user_id, username, color));

        profile.username = username.to_string();
        profile.color = color.to_string();
        profile.public_key = Some(public_key.to_string());

        info!(user_id = %user_id, username = %username, "Profile registered");
        Ok(profile.clone())
    }
}
