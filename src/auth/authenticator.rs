use async_trait::async_trait;

use super::token::TokenConfig;
use crate::session::UserId;
use crate::shared::AppError;

/// Authentication collaborator: turns a bearer credential into an identity
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AppError>;
}

/// Authenticator for HS256 tokens whose `sub` claim is the user id
pub struct JwtAuthenticator {
    tokens: TokenConfig,
}

impl JwtAuthenticator {
    pub fn new(tokens: TokenConfig) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, AppError> {
        let claims = self.tokens.validate_token(token)?;
        Ok(claims.sub)
    }
}
