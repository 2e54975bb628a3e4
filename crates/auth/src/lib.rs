use http::HeaderMap;
use http::header;

mod directory;
mod ldap;
mod token;

pub use directory::{DirectoryConfig, DirectoryConnector, DirectorySession, IdentityBridge, user_filter};
pub use ldap::LdapConnector;
pub use token::{IDENTITY_TOKEN_TTL, IdentityClaims, IdentityToken, TokenIssuer};

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    pub(crate) fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::new("ERR_AUTH_REQUIRED", "missing Authorization header"))?;

    let token = authz
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::new("ERR_AUTH_INVALID", "Authorization must be a Bearer token"))?;

    if token.trim().is_empty() {
        return Err(AuthError::new("ERR_AUTH_INVALID", "Bearer token is empty"));
    }

    Ok(token.trim().to_string())
}
