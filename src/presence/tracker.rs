use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::subscriptions::SubscriptionIndex;
use crate::events::ServerEvent;
use crate::profile::ProfileStore;
use crate::room::RoomDirectory;
use crate::session::{PresenceReceiver, PresenceTransition, SessionRegistry, UserId};
use crate::shared::AppError;

/// Turns session aliveness transitions into persisted presence and
/// `updateUser` notifications.
pub struct PresenceTracker {
    registry: Arc<SessionRegistry>,
    profiles: Arc<dyn ProfileStore>,
    rooms: Arc<dyn RoomDirectory>,
    subscriptions: Arc<SubscriptionIndex>,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<SessionRegistry>,
        profiles: Arc<dyn ProfileStore>,
        rooms: Arc<dyn RoomDirectory>,
        subscriptions: Arc<SubscriptionIndex>,
    ) -> Self {
        Self {
            registry,
            profiles,
            rooms,
            subscriptions,
        }
    }

    /// Start the tracker - spawns a background task that handles transitions
    /// one at a time, in the order sessions reported them
    pub fn start(self: Arc<Self>, mut transitions: PresenceReceiver) -> JoinHandle<()> {
        info!("Starting presence tracker");

        tokio::spawn(async move {
            while let Some(transition) = transitions.recv().await {
                if let Err(e) = self.handle_transition(&transition).await {
                    warn!(
                        identity = %transition.identity,
                        error = %e,
                        "Presence transition failed"
                    );
                }
            }

            warn!("Presence tracker stopped - transition channel closed");
        })
    }

    /// Handles one transition and returns the number of sessions notified.
    ///
    /// The new status is read from the session itself, so a disconnect that
    /// was already undone by a reconnect produces no notification.
    #[instrument(skip(self), fields(identity = %transition.identity))]
    pub async fn handle_transition(
        &self,
        transition: &PresenceTransition,
    ) -> Result<usize, AppError> {
        let online = match self.registry.get(&transition.identity) {
            Some(session) => session.is_alive().await,
            None => transition.online,
        };

        let Some(profile) = self.profiles.get_profile(&transition.identity).await? else {
            warn!("Presence change for unknown profile");
            return Ok(0);
        };

        if profile.online == online {
            debug!(online = online, "Presence unchanged, not notifying");
            return Ok(0);
        }

        self.profiles
            .set_online_status(&transition.identity, online)
            .await?;

        let audience = self.audience(&transition.identity).await;
        let event = ServerEvent::update_user(&profile, online);

        let mut notified = 0;
        for viewer in &audience {
            let Some(session) = self.registry.get(viewer) else {
                continue;
            };
            match session.send(&event).await {
                Ok(_) => notified += 1,
                Err(e) => warn!(
                    viewer = %viewer,
                    error = %e,
                    "Failed to send presence update"
                ),
            }
        }

        info!(
            online = online,
            audience = audience.len(),
            notified = notified,
            "Presence change broadcast"
        );
        Ok(notified)
    }

    /// Room co-members plus explicit subscribers, without the identity itself
    pub async fn audience(&self, identity: &str) -> HashSet<UserId> {
        let mut audience = self.rooms.get_user_views(identity).await;
        audience.extend(self.subscriptions.subscribers_of(identity));
        audience.remove(identity);
        audience
    }
}
