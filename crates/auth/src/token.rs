use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::AuthError;

pub const IDENTITY_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone)]
pub struct IdentityToken {
    pub token: String,
    pub claims: IdentityClaims,
}

/// Signs and verifies the gateway's own HS256 identity tokens.
///
/// Tokens are stateless: there is no revocation list, a token stays valid until `exp`.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::new(
                "ERR_INVALID_CONFIG",
                "identity token secret must be non-empty",
            ));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn issue(&self, subject: &str) -> Result<IdentityToken, AuthError> {
        self.issue_at(subject, unix_now_secs())
    }

    pub fn issue_at(&self, subject: &str, issued_at: u64) -> Result<IdentityToken, AuthError> {
        let claims = IdentityClaims {
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(IDENTITY_TOKEN_TTL.as_secs()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| AuthError::new("ERR_INTERNAL", "failed to sign identity token"))?;

        Ok(IdentityToken { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        self.verify_at(token, unix_now_secs())
    }

    /// Rejects the token at or after its `exp` second.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<IdentityClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let decoded = decode::<IdentityClaims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::new("ERR_AUTH_INVALID", "invalid identity token"))?;

        let claims = decoded.claims;
        if now >= claims.exp {
            return Err(AuthError::new("ERR_AUTH_INVALID", "identity token expired"));
        }
        if claims.sub.trim().is_empty() {
            return Err(AuthError::new("ERR_AUTH_INVALID", "identity token has no subject"));
        }

        Ok(claims)
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
