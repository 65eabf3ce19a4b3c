// Public API - what other modules can use
pub use handlers::{health, update_profile, HealthResponse};
pub use models::Profile;
pub use store::{InMemoryProfileStore, ProfileStore};

// Internal modules
mod handlers;
mod models;
mod store;
