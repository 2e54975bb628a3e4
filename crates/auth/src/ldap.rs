use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};

use crate::AuthError;
use crate::directory::{DirectoryConnector, DirectorySession};

/// LDAPS connector that trusts exactly one private certificate authority.
#[derive(Clone)]
pub struct LdapConnector {
    url: String,
    tls: native_tls::TlsConnector,
    operation_timeout: Duration,
}

impl LdapConnector {
    pub fn new(
        url: &str,
        ca_cert_pem: &[u8],
        operation_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let ca = native_tls::Certificate::from_pem(ca_cert_pem).map_err(|_| {
            AuthError::new(
                "ERR_INVALID_CONFIG",
                "directory CA certificate is not valid PEM",
            )
        })?;

        let tls = native_tls::TlsConnector::builder()
            .add_root_certificate(ca)
            .build()
            .map_err(|_| {
                AuthError::new(
                    "ERR_INVALID_CONFIG",
                    "failed to initialize directory TLS connector",
                )
            })?;

        Ok(Self {
            url: url.to_string(),
            tls,
            operation_timeout,
        })
    }

    pub fn from_ca_file(
        url: &str,
        ca_cert_path: &str,
        operation_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let pem = std::fs::read(ca_cert_path).map_err(|_| {
            AuthError::new(
                "ERR_INVALID_CONFIG",
                format!("failed to read directory CA certificate at {}", ca_cert_path),
            )
        })?;
        Self::new(url, &pem, operation_timeout)
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, AuthError> {
        let settings = LdapConnSettings::new()
            .set_connector(self.tls.clone())
            .set_conn_timeout(self.operation_timeout);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "directory connection failed");
                AuthError::new("ERR_DIRECTORY_UNAVAILABLE", "directory connection failed")
            })?;

        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                tracing::warn!(error = %err, "directory connection closed with error");
            }
        });

        Ok(Box::new(LdapSession { ldap }))
    }
}

struct LdapSession {
    ldap: Ldap,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool, AuthError> {
        let result = self.ldap.simple_bind(dn, password).await.map_err(|err| {
            tracing::warn!(error = %err, "directory bind request failed");
            AuthError::new("ERR_DIRECTORY_UNAVAILABLE", "directory bind request failed")
        })?;

        Ok(result.rc == 0)
    }

    async fn search(&mut self, base_dn: &str, filter: &str) -> Result<Vec<String>, AuthError> {
        let (entries, _) = self
            .ldap
            .search(base_dn, Scope::Subtree, filter, vec!["dn"])
            .await
            .and_then(|result| result.success())
            .map_err(|err| {
                tracing::warn!(error = %err, "directory search failed");
                AuthError::new("ERR_DIRECTORY_UNAVAILABLE", "directory search failed")
            })?;

        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).dn)
            .collect())
    }

    async fn close(&mut self) {
        if let Err(err) = self.ldap.unbind().await {
            tracing::debug!(error = %err, "directory unbind failed");
        }
    }
}
