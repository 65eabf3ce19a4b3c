use serde::{Deserialize, Serialize};

use crate::session::UserId;

/// JWT claims identifying the connecting user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthClaims {
    pub sub: UserId,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

/// Identity of an authenticated request, inserted by [`jwt_auth`](super::jwt_auth)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}
