use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::error::AuthError;
use crate::state::AppState;

/// Session payload. Deliberately carries no `exp`: a session lives until the
/// holder drops it or the signing secret rotates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
}

/// Reset payload. Unlike sessions, expiry is enforced by the codec itself
/// since reset tokens are never persisted server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Malformed,
    }
}

/// Signs and verifies stateless session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn sign(&self, user_id: Uuid, email: &str) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: user_id,
            email: email.to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.into()))?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    /// Signature check only; there is no expiry claim to enforce.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let data =
            decode::<SessionClaims>(token, &self.decoding, &validation).map_err(map_jwt_error)?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.auth.session_secret)
    }
}

/// Signs and verifies time-boxed password-reset tokens.
#[derive(Clone)]
pub struct ResetKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDuration,
}

impl ResetKeys {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: TimeDuration::minutes(ttl_minutes),
        }
    }

    pub fn sign(&self, email: &str) -> Result<String, AuthError> {
        self.sign_at(email, OffsetDateTime::now_utc())
    }

    fn sign_at(&self, email: &str, now: OffsetDateTime) -> Result<String, AuthError> {
        let exp = now + self.ttl;
        let claims = ResetClaims {
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.into()))
    }

    /// Returns the email the token was issued for. No mutation happens here;
    /// the reset handler re-hashes and persists the new password itself.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        // No grace window: a token one second past exp is expired.
        validation.leeway = 0;
        let data =
            decode::<ResetClaims>(token, &self.decoding, &validation).map_err(map_jwt_error)?;
        Ok(data.claims.email)
    }
}

impl FromRef<AppState> for ResetKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            &state.config.auth.reset_secret,
            state.config.auth.reset_ttl_minutes,
        )
    }
}
