//! Access tokens
//!
//! HS256 JWTs carrying `sub`, `jti`, `iat` and `exp`. Every issued JTI is
//! recorded in the [`TokenStore`]; a token whose JTI is missing from the
//! store or revoked there is rejected even if its signature is valid.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::{ServiceError, ServiceResult};
use crate::token_store::TokenStore;

pub const LOGOUT: &str = "logout";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AccessTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    store: TokenStore,
    ttl: Duration,
}

impl AccessTokens {
    pub fn new(secret: &str, store: TokenStore, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            store,
            ttl,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Sign a token for `user_id` and register its JTI.
    pub async fn issue(&self, user_id: &str) -> ServiceResult<IssuedToken> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|_| ServiceError::internal("access token expiry out of range"))?;
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ServiceError::internal(format!("sign access token: {}", e)))?;
        self.store.store(&claims.jti, user_id, self.ttl).await?;

        tracing::debug!(user_id = %user_id, jti = %claims.jti, "Access token issued");
        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    /// Check signature, expiry and the JTI's standing in the token store.
    pub async fn validate(&self, token: &str) -> ServiceResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        validation.set_required_spec_claims(&["exp", "sub", "jti"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                ServiceError::Unauthorized("invalid access token".into())
            })?
            .claims;

        match self.store.get(&claims.jti).await? {
            Some(data) if !data.revoked && data.user_id == claims.sub => Ok(claims),
            Some(data) if data.revoked => {
                tracing::info!(jti = %claims.jti, revoked_by = ?data.revoked_by, "Revoked access token presented");
                Err(ServiceError::Unauthorized("access token revoked".into()))
            }
            _ => Err(ServiceError::Unauthorized("unknown access token".into())),
        }
    }

    pub async fn revoke(&self, jti: &str, by: &str) -> ServiceResult<bool> {
        let revoked = self.store.revoke(jti, by).await?;
        if revoked {
            tracing::info!(jti = %jti, revoked_by = %by, "Access token revoked");
        }
        Ok(revoked)
    }
}
