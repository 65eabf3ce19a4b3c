use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

use crate::session::UserId;

/// Explicit presence subscriptions: target identity to subscriber identities.
///
/// Memory-only. Entries are removed once their last subscriber leaves.
#[derive(Default)]
pub struct SubscriptionIndex {
    entries: DashMap<UserId, HashSet<UserId>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the subscription was newly added
    pub fn subscribe(&self, target: &str, subscriber: &str) -> bool {
        let added = self
            .entries
            .entry(target.to_string())
            .or_default()
            .insert(subscriber.to_string());
        debug!(target_id = %target, subscriber = %subscriber, added = added, "Subscribe");
        added
    }

    /// Returns true when an existing subscription was removed
    pub fn unsubscribe(&self, target: &str, subscriber: &str) -> bool {
        let removed = match self.entries.get_mut(target) {
            Some(mut subscribers) => subscribers.remove(subscriber),
            None => false,
        };
        // Re-checked under the shard lock so a concurrent subscribe isn't lost
        self.entries
            .remove_if(target, |_, subscribers| subscribers.is_empty());
        debug!(target_id = %target, subscriber = %subscriber, removed = removed, "Unsubscribe");
        removed
    }

    /// Snapshot of everyone subscribed to `target`
    pub fn subscribers_of(&self, target: &str) -> HashSet<UserId> {
        self.entries
            .get(target)
            .map(|subscribers| subscribers.clone())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, target: &str, subscriber: &str) -> bool {
        self.entries
            .get(target)
            .is_some_and(|subscribers| subscribers.contains(subscriber))
    }
}
