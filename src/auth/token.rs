//! Bearer token issuance and validation.
//!
//! Tokens are HS256 JWTs binding a user id and the admin flag. A token is
//! accepted while its signature and expiry check out and it is not on the
//! revocation list; the list is consulted on every validation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::access::Caller;
use super::revocation::{hash_token, RevocationStore};
use crate::api::metrics::{TOKENS_ISSUED_TOTAL, TOKENS_REVOKED_TOTAL};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id
    uid: i64,
    /// Whether the user is an admin
    adm: bool,
    /// Issued at (Unix timestamp)
    iat: i64,
    /// Expiration (Unix timestamp)
    exp: i64,
    /// Unique token id, so two tokens issued in the same second differ
    jti: String,
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    revoked: Arc<dyn RevocationStore>,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration, revoked: Arc<dyn RevocationStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            revoked,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: i64, is_admin: bool) -> Result<IssuedToken, TokenError> {
        self.issue_with_ttl(user_id, is_admin, self.ttl)
    }

    pub fn issue_with_ttl(
        &self,
        user_id: i64,
        is_admin: bool,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = Claims {
            uid: user_id,
            adm: is_admin,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        metrics::counter!(TOKENS_ISSUED_TOTAL).increment(1);
        Ok(IssuedToken { token, expires_at })
    }

    /// Check signature and expiry only
    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Rejected bearer token");
                TokenError::Invalid
            })
    }

    pub async fn validate(&self, token: &str) -> Result<Caller, TokenError> {
        let claims = self.decode(token)?;

        if self.revoked.is_revoked(&hash_token(token)).await? {
            debug!(user_id = claims.uid, "Rejected revoked token");
            return Err(TokenError::Invalid);
        }

        Ok(Caller {
            user_id: claims.uid,
            is_admin: claims.adm,
        })
    }

    /// Put a token on the revocation list until its own expiry
    pub async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let claims = self.decode(token)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(TokenError::Invalid)?;

        self.revoked.revoke(&hash_token(token), expires_at).await?;
        metrics::counter!(TOKENS_REVOKED_TOTAL).increment(1);
        debug!(user_id = claims.uid, "Revoked token");
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64, TokenError> {
        Ok(self.revoked.purge_expired().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryRevocationStore;

    fn service() -> TokenService {
        TokenService::new(
            "test-secret",
            Duration::hours(1),
            Arc::new(MemoryRevocationStore::new()),
        )
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let tokens = service();
        let issued = tokens.issue(7, true).unwrap();
        assert!(issued.expires_at > Utc::now());

        let caller = tokens.validate(&issued.token).await.unwrap();
        assert_eq!(caller.user_id, 7);
        assert!(caller.is_admin);
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected_before_expiry() {
        let tokens = service();
        let issued = tokens.issue(7, false).unwrap();

        tokens.revoke(&issued.token).await.unwrap();

        let result = tokens.validate(&issued.token).await;
        assert!(matches!(result, Err(TokenError::Invalid)));

        // Other tokens of the same user are unaffected
        let other = tokens.issue(7, false).unwrap();
        assert!(tokens.validate(&other.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let tokens = service();
        let issued = tokens.issue_with_ttl(7, false, Duration::seconds(-5)).unwrap();
        assert!(matches!(
            tokens.validate(&issued.token).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_foreign_signature_is_rejected() {
        let issued = TokenService::new(
            "other-secret",
            Duration::hours(1),
            Arc::new(MemoryRevocationStore::new()),
        )
        .issue(7, true)
        .unwrap();

        assert!(matches!(
            service().validate(&issued.token).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_malformed_token_is_rejected() {
        let tokens = service();
        for garbage in ["", "not-a-jwt", "a.b.c"] {
            assert!(matches!(
                tokens.validate(garbage).await,
                Err(TokenError::Invalid)
            ));
        }
    }

    #[tokio::test]
    async fn test_revoking_an_expired_token_fails() {
        let tokens = service();
        let issued = tokens.issue_with_ttl(7, false, Duration::seconds(-5)).unwrap();
        assert!(matches!(
            tokens.revoke(&issued.token).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_tokens_issued_together_differ() {
        let tokens = service();
        let a = tokens.issue(7, false).unwrap();
        let b = tokens.issue(7, false).unwrap();
        assert_ne!(a.token, b.token);
    }
}
