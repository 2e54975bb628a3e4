use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::AuthError;
use crate::token::{IdentityClaims, IdentityToken, TokenIssuer};

/// Opens fresh, unauthenticated connections to the directory.
///
/// Authentication is bound to the connection in LDAP, so every bind that must be
/// judged on its own gets its own connection.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, AuthError>;
}

#[async_trait]
pub trait DirectorySession: Send {
    /// `Ok(false)` means the directory answered and rejected the credentials.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool, AuthError>;

    /// Distinguished names of every entry under `base_dn` matching `filter`.
    async fn search(&mut self, base_dn: &str, filter: &str) -> Result<Vec<String>, AuthError>;

    async fn close(&mut self);
}

#[derive(Clone)]
pub struct DirectoryConfig {
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_password: Option<String>,
    pub account_attribute: String,
    pub object_class: String,
    pub operation_timeout: Duration,
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password_set", &self.bind_password.is_some())
            .field("account_attribute", &self.account_attribute)
            .field("object_class", &self.object_class)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

/// Search filter for one account, with the username escaped per RFC 4515.
pub fn user_filter(object_class: &str, account_attribute: &str, username: &str) -> String {
    format!(
        "(&(objectClass={})({}={}))",
        object_class,
        account_attribute,
        ldap3::ldap_escape(username)
    )
}

/// Delegated directory login: service bind, user search, then a user bind on a second
/// connection. A successful login yields a signed identity token; the password is never
/// stored.
#[derive(Clone)]
pub struct IdentityBridge {
    config: DirectoryConfig,
    connector: Arc<dyn DirectoryConnector>,
    issuer: TokenIssuer,
}

impl IdentityBridge {
    pub fn new(
        config: DirectoryConfig,
        connector: Arc<dyn DirectoryConnector>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            config,
            connector,
            issuer,
        }
    }

    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IdentityToken, AuthError> {
        if username.trim().is_empty() {
            return Err(user_not_found());
        }
        // An empty password turns a simple bind into an anonymous bind, which succeeds.
        if password.is_empty() {
            return Err(invalid_credentials());
        }

        let bind_password = self
            .config
            .bind_password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AuthError::new(
                    "ERR_INVALID_CONFIG",
                    "directory bind password is not configured",
                )
            })?;

        let user_dn = {
            let mut session = self.within("connect", self.connector.connect()).await?;
            let located = self
                .within(
                    "search",
                    locate_user(session.as_mut(), &self.config, bind_password, username),
                )
                .await;
            session.close().await;
            located?
        };

        let mut session = self.within("connect", self.connector.connect()).await?;
        let bound = self
            .within("bind", session.bind(&user_dn, password))
            .await;
        session.close().await;

        if !bound? {
            return Err(invalid_credentials());
        }

        self.issuer.issue(username)
    }

    pub fn verify(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        self.issuer.verify(token)
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    async fn within<T>(
        &self,
        step: &'static str,
        fut: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        tokio::time::timeout(self.config.operation_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(AuthError::new(
                    "ERR_DIRECTORY_UNAVAILABLE",
                    format!("directory {} timed out", step),
                ))
            })
    }
}

async fn locate_user(
    session: &mut dyn DirectorySession,
    config: &DirectoryConfig,
    bind_password: &str,
    username: &str,
) -> Result<String, AuthError> {
    if !session.bind(&config.bind_dn, bind_password).await? {
        return Err(AuthError::new(
            "ERR_INVALID_CONFIG",
            "directory rejected the service account bind",
        ));
    }

    let filter = user_filter(&config.object_class, &config.account_attribute, username);
    let mut dns = session.search(&config.base_dn, &filter).await?;
    if dns.len() != 1 {
        return Err(user_not_found());
    }

    Ok(dns.remove(0))
}

fn user_not_found() -> AuthError {
    AuthError::new("ERR_USER_NOT_FOUND", "no unique directory entry for username")
}

fn invalid_credentials() -> AuthError {
    AuthError::new("ERR_INVALID_CREDENTIALS", "directory rejected user credentials")
}
