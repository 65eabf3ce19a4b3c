use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::directory::RoomDirectory;
use crate::events::ServerEvent;
use crate::session::{Delivery, SessionRegistry, UserId};

/// Per-call outcome of a room fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutReport {
    /// Written to at least one live connection
    pub delivered: usize,
    /// Retained in an offline session's backlog
    pub queued: usize,
    /// Excluded, or member without a session
    pub skipped: usize,
    /// Per-recipient send failures
    pub failed: usize,
}

/// Delivers room-scoped events to every member's session
pub struct RoomFanout {
    registry: Arc<SessionRegistry>,
    rooms: Arc<dyn RoomDirectory>,
}

impl RoomFanout {
    pub fn new(registry: Arc<SessionRegistry>, rooms: Arc<dyn RoomDirectory>) -> Self {
        Self { registry, rooms }
    }

    /// Sends `event` to each current member of `room_id` not in `excluded`.
    ///
    /// Members are visited in membership order. A failure for one member
    /// never stops delivery to the others.
    #[instrument(skip(self, event, excluded), fields(event = %event.event_name()))]
    pub async fn fan_out(
        &self,
        room_id: &str,
        event: &ServerEvent,
        excluded: &[UserId],
    ) -> FanoutReport {
        let mut report = FanoutReport::default();

        let members = match self.rooms.get_room_members(room_id).await {
            Ok(Some(members)) => members,
            Ok(None) => {
                debug!(room_id = %room_id, "Room not found, nothing to fan out");
                return report;
            }
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Failed to resolve room members");
                return report;
            }
        };

        for member in &members {
            if excluded.contains(member) {
                report.skipped += 1;
                continue;
            }

            let Some(session) = self.registry.get(member) else {
                report.skipped += 1;
                continue;
            };

            match session.send(event).await {
                Ok(Delivery::Written(_)) => report.delivered += 1,
                Ok(Delivery::Queued) => report.queued += 1,
                Ok(Delivery::Dropped) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        room_id = %room_id,
                        recipient = %member,
                        error = %e,
                        "Failed to send event to room member"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            room_id = %room_id,
            members = members.len(),
            delivered = report.delivered,
            queued = report.queued,
            skipped = report.skipped,
            failed = report.failed,
            "Room fan-out complete"
        );
        report
    }
}
