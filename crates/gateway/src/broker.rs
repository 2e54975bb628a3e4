use std::sync::Arc;
use std::time::Instant;

use opsgate_contracts::TargetKind;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::config::Credential;
use crate::metrics;
use crate::registry::{Target, TargetRegistry, UnknownTarget};
use crate::upstream::transport_reason;

/// A backend token valid for the single request that obtained it.
pub struct BackendSession {
    token: String,
    target: Arc<Target>,
}

impl BackendSession {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

impl std::fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSession")
            .field("target", &self.target.name())
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    UnknownTarget(UnknownTarget),
    BackendUnreachable(String),
    /// The backend refused the stored credentials; body is the backend's response.
    AuthRejected { status: u16, body: String },
    InvalidResponse(String),
    Misconfigured(String),
}

impl BrokerError {
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::UnknownTarget(_) => "ERR_UNKNOWN_TARGET",
            BrokerError::BackendUnreachable(_) => "ERR_BACKEND_UNREACHABLE",
            BrokerError::AuthRejected { .. } => "ERR_BACKEND_AUTH_REJECTED",
            BrokerError::InvalidResponse(_) => "ERR_BACKEND_INVALID_RESPONSE",
            BrokerError::Misconfigured(_) => "ERR_INVALID_CONFIG",
        }
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::UnknownTarget(err) => write!(f, "{}", err),
            BrokerError::BackendUnreachable(reason) => {
                write!(f, "backend login unreachable: {}", reason)
            }
            BrokerError::AuthRejected { status, .. } => {
                write!(f, "backend rejected login with status {}", status)
            }
            BrokerError::InvalidResponse(reason) => {
                write!(f, "backend login response invalid: {}", reason)
            }
            BrokerError::Misconfigured(reason) => write!(f, "target misconfigured: {}", reason),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<UnknownTarget> for BrokerError {
    fn from(err: UnknownTarget) -> Self {
        BrokerError::UnknownTarget(err)
    }
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    token: String,
}

/// Exchanges a target's stored service credentials for a fresh ArgoCD session token.
///
/// Every call performs exactly one login; tokens are never cached or reused.
#[derive(Debug, Clone)]
pub struct SessionBroker {
    registry: Arc<TargetRegistry>,
}

impl SessionBroker {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub async fn open_session(&self, target: Option<&str>) -> Result<BackendSession, BrokerError> {
        let target = self.registry.resolve(TargetKind::ArgoCd, target)?;

        let span = tracing::info_span!(
            "broker.open_session",
            target = %target.name(),
            latency_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let started = Instant::now();

        let result = login(target).instrument(span.clone()).await;

        span.record("latency_ms", started.elapsed().as_millis() as u64);
        span.record("outcome", if result.is_ok() { "ok" } else { "error" });
        result
    }
}

async fn login(target: Arc<Target>) -> Result<BackendSession, BrokerError> {
    let Credential::Basic { username, password } = &target.config().credential else {
        return Err(BrokerError::Misconfigured(format!(
            "argocd target {} has no username/password credential",
            target.name()
        )));
    };

    let response = target
        .http()
        .post(target.endpoint(&["api", "v1", "session"]))
        .json(&SessionRequest { username, password })
        .send()
        .await
        .map_err(|err| {
            metrics::observe_backend_call("argocd", "session", "unreachable");
            tracing::warn!(reason = %transport_reason(&err), "argocd login unreachable");
            BrokerError::BackendUnreachable(transport_reason(&err))
        })?;

    if response.status() != StatusCode::OK {
        metrics::observe_backend_call("argocd", "session", "rejected");
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status, "argocd rejected service credentials");
        return Err(BrokerError::AuthRejected { status, body });
    }

    let session = response.json::<SessionResponse>().await.map_err(|_| {
        metrics::observe_backend_call("argocd", "session", "invalid");
        BrokerError::InvalidResponse("session response is not valid JSON".to_string())
    })?;

    if session.token.is_empty() {
        metrics::observe_backend_call("argocd", "session", "invalid");
        return Err(BrokerError::InvalidResponse(
            "session response carries no token".to_string(),
        ));
    }

    metrics::observe_backend_call("argocd", "session", "ok");
    Ok(BackendSession {
        token: session.token,
        target,
    })
}
