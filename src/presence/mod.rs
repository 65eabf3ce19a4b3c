pub use handlers::{subscribe, unsubscribe};
pub use subscriptions::SubscriptionIndex;
pub use tracker::PresenceTracker;

mod handlers;
mod subscriptions;
mod tracker;
