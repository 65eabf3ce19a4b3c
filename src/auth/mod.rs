// Public API - what other modules can use
pub use authenticator::{Authenticator, JwtAuthenticator};
pub use middleware::jwt_auth;
pub use token::TokenConfig;
pub use types::{AuthClaims, AuthenticatedUser};

// Internal modules
mod authenticator;
mod middleware;
mod token;
mod types;
