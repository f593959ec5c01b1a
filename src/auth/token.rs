use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rbac::Role;

pub const ISSUER: &str = "staff-portal";

/// JWT claims carried by portal access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Sign an HS256 access token for the given user.
pub fn issue(
    secret: &str,
    user_id: Uuid,
    email: &str,
    role: Role,
    ttl: Duration,
) -> anyhow::Result<IssuedToken> {
    let now = Utc::now();
    let expires_at = now + ttl;
    let claims = Claims {
        sub: user_id,
        email: email.to_owned(),
        role: role.as_str().to_owned(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        iss: ISSUER.to_owned(),
    };

    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("failed to sign token: {e}"))?;

    Ok(IssuedToken { token, expires_at })
}

/// Verify signature, expiry and issuer. Any failure is reported as `None`;
/// callers turn that into a 401.
pub fn verify(secret: &str, token: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.leeway = 0;

    match jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!(error = %e, "token rejected");
            None
        }
    }
}
