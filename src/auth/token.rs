use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument, warn};

use super::types::AuthClaims;
use crate::config::env_or;
use crate::shared::AppError;

const DEFAULT_TTL_HOURS: i64 = 24 * 30;

/// HS256 signing and verification of identity tokens
#[derive(Clone)]
pub struct TokenConfig {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenConfig {
    /// Reads `JWT_SECRET` and `TOKEN_TTL_HOURS`
    pub fn new() -> Self {
        let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using an insecure development secret");
            "roomcast-development-secret".to_string()
        });
        let ttl_hours = env_or("TOKEN_TTL_HOURS", DEFAULT_TTL_HOURS).max(1);

        Self::with_secret(secret).with_ttl(Duration::hours(ttl_hours))
    }

    pub fn with_secret(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            validation,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issues a token whose subject is the given user id
    #[instrument(skip(self))]
    pub fn create_token(&self, user_id: &str) -> Result<String, AppError> {
        let issued_at = Utc::now();
        let claims = AuthClaims {
            sub: user_id.to_string(),
            exp: (issued_at + self.ttl).timestamp() as usize,
            iat: issued_at.timestamp() as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::JwtError(e.to_string()))
    }

    /// Verifies signature and expiry and returns the claims.
    /// A token without a subject is rejected.
    #[instrument(skip(self, token))]
    pub fn validate_token(&self, token: &str) -> Result<AuthClaims, AppError> {
        let claims = decode::<AuthClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                AppError::JwtError(e.to_string())
            })?
            .claims;

        if claims.sub.is_empty() {
            debug!("Token carries an empty subject");
            return Err(AppError::JwtError("Token subject is empty".to_string()));
        }
        Ok(claims)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}
