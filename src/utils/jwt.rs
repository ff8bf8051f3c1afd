use std::time::{Duration, Instant};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::IdentityConfig,
    error::{AppError, Result},
    models::UserRole,
};

/// Claims carried by identity-platform tokens. `sub` is the profile uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Clock skew tolerated on `exp`.
pub const LEEWAY_SECS: u64 = 60;

impl Claims {
    /// One sign-in of one user. A fresh token starts a fresh session.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.sub, self.iat)
    }

    /// How much longer the token verifies, leeway included.
    pub fn valid_for(&self, now_unix: i64) -> Duration {
        let remaining = self
            .exp
            .saturating_add(LEEWAY_SECS as i64)
            .saturating_sub(now_unix);
        Duration::from_secs(u64::try_from(remaining).unwrap_or(0))
    }

    /// `valid_for` as a monotonic deadline.
    pub fn expires_at(&self, now: Instant) -> Instant {
        let valid_for = self.valid_for(chrono::Utc::now().timestamp());
        now.checked_add(valid_for).unwrap_or(now)
    }
}

#[cfg(test)]
pub fn generate_token(
    config: &IdentityConfig,
    uid: &str,
    email: &str,
    role: UserRole,
    ttl: chrono::Duration,
) -> Result<String> {
    let now = chrono::Utc::now();
    let expiration = now
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::InternalError("Failed to calculate expiration".to_string()))?;

    let claims = Claims {
        sub: uid.to_string(),
        email: email.to_string(),
        role,
        iat: now.timestamp(),
        exp: expiration.timestamp(),
        iss: config.issuer.clone(),
        aud: config.audience.clone(),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Token generation failed: {}", e)))
}

pub fn verify_token(config: &IdentityConfig, token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation.leeway = LEEWAY_SECS;

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    match config.audience {
        Some(ref audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected identity token: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })
}
