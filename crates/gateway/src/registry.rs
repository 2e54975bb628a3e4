use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use opsgate_contracts::{TargetInfo, TargetKind};
use reqwest::Url;

use crate::config::{GatewayConfig, StartupError, TargetConfig};

/// One configured backend installation plus the HTTP client used to reach it.
#[derive(Debug)]
pub struct Target {
    config: TargetConfig,
    http: reqwest::Client,
}

impl Target {
    fn new(config: TargetConfig, timeout: Duration) -> Result<Self, StartupError> {
        if config.insecure_skip_tls_verify {
            tracing::warn!(
                target_kind = config.kind.as_str(),
                target_name = %config.name,
                "TLS certificate verification disabled for target"
            );
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .build()
            .map_err(|_| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!(
                    "failed to initialize HTTP client for {} target {}",
                    config.kind.as_str(),
                    config.name
                ),
            })?;

        Ok(Self { config, http })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn kind(&self) -> TargetKind {
        self.config.kind
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Appends percent-encoded path segments to the target's base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.config.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTarget {
    pub kind: TargetKind,
    pub name: String,
}

impl std::fmt::Display for UnknownTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} target {}", self.kind.as_str(), self.name)
    }
}

impl std::error::Error for UnknownTarget {}

/// Immutable target lookup, built once at startup and shared behind `Arc`.
#[derive(Debug)]
pub struct TargetRegistry {
    targets: BTreeMap<(TargetKind, String), Arc<Target>>,
    default_target: String,
}

impl TargetRegistry {
    pub fn new(
        targets: Vec<TargetConfig>,
        default_target: &str,
        timeout: Duration,
    ) -> Result<Self, StartupError> {
        let mut by_key = BTreeMap::new();
        for config in targets {
            let key = (config.kind, config.name.clone());
            if by_key.contains_key(&key) {
                return Err(StartupError {
                    code: "ERR_INVALID_CONFIG",
                    message: format!("duplicate {} target {}", key.0.as_str(), key.1),
                });
            }
            by_key.insert(key, Arc::new(Target::new(config, timeout)?));
        }

        Ok(Self {
            targets: by_key,
            default_target: default_target.to_string(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, StartupError> {
        let targets = config
            .argocd
            .iter()
            .chain(config.tekton.iter())
            .cloned()
            .collect();
        Self::new(targets, &config.default_target, config.backend_timeout())
    }

    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    /// Looks up a target; `None` or a blank name selects the default target.
    pub fn resolve(&self, kind: TargetKind, name: Option<&str>) -> Result<Arc<Target>, UnknownTarget> {
        let name = name
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_target.as_str());

        self.targets
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| UnknownTarget {
                kind,
                name: name.to_string(),
            })
    }

    /// ArgoCD targets first, then Tekton, each sorted by name.
    pub fn targets(&self) -> Vec<TargetInfo> {
        self.targets
            .keys()
            .map(|(kind, name)| TargetInfo::new(*kind, name))
            .collect()
    }
}
