pub mod assertions;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::{assert_message, assert_update_member, assert_update_user};
#[allow(unused_imports)]
pub use mocks::{FlakyProfileStore, FlakyRoomDirectory};
#[allow(unused_imports)]
pub use setup::{TestClient, TestSetup, TestSetupBuilder, TestUser};
