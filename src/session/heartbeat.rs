use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::session::Session;

/// What the heartbeat task should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Continue,
    Stop,
}

/// Spawns the per-session heartbeat task.
///
/// The task holds a weak reference so a dropped session ends it.
pub(super) fn spawn(session: Weak<Session>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(session) = session.upgrade() else {
                break;
            };

            if session.heartbeat_tick().await == HeartbeatAction::Stop {
                debug!(identity = %session.identity(), "Heartbeat stopped");
                break;
            }
        }
    })
}
