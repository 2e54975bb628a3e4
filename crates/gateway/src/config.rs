use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use opsgate_contracts::TargetKind;
use regex::{Captures, Regex};
use reqwest::Url;
use serde::Deserialize;

const MAX_FANOUT_CONCURRENCY: usize = 64;

#[derive(Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub backend_timeout_ms: u64,
    pub directory_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub fanout_concurrency: usize,
    pub default_target: String,
    pub token_secret: String,
    pub ldap: LdapSettings,
    pub argocd: Vec<TargetConfig>,
    pub tekton: Vec<TargetConfig>,
    pub allowed_origins: Vec<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind_addr", &self.bind_addr)
            .field("backend_timeout_ms", &self.backend_timeout_ms)
            .field("directory_timeout_ms", &self.directory_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("fanout_concurrency", &self.fanout_concurrency)
            .field("default_target", &self.default_target)
            .field("ldap", &self.ldap)
            .field("argocd", &self.argocd)
            .field("tekton", &self.tekton)
            .field("allowed_origins", &self.allowed_origins)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct LdapSettings {
    pub url: String,
    pub base_dn: String,
    pub ca_cert_path: String,
    pub bind_dn: String,
    /// Looked up from the environment variable named by `binduser_password_env`.
    pub bind_password: Option<String>,
    pub account_attribute: String,
    pub object_class: String,
}

impl std::fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSettings")
            .field("url", &self.url)
            .field("base_dn", &self.base_dn)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password_set", &self.bind_password.is_some())
            .field("account_attribute", &self.account_attribute)
            .field("object_class", &self.object_class)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub name: String,
    pub kind: TargetKind,
    pub base_url: Url,
    pub credential: Credential,
    pub insecure_skip_tls_verify: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Basic { username: String, password: String },
    Token(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    server: RawServer,
    auth: RawAuth,
    ldap: RawLdap,
    argocd: BTreeMap<String, RawArgoTarget>,
    tekton: BTreeMap<String, RawTektonTarget>,
    frontend: RawFrontend,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawServer {
    bind_addr: Option<String>,
    backend_timeout_ms: Option<u64>,
    directory_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    fanout_concurrency: Option<usize>,
    default_target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawAuth {
    token_secret: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawLdap {
    url: String,
    base_dn: String,
    ca_cert_path: String,
    binduser: String,
    binduser_password_env: String,
    account_attribute: Option<String>,
    object_class: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawArgoTarget {
    api_url: String,
    username: String,
    password: String,
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTektonTarget {
    api_url: String,
    token: String,
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawFrontend {
    allowed_origins: Vec<String>,
}

impl GatewayConfig {
    pub fn load(path: &str) -> Result<Self, StartupError> {
        let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
            code: "ERR_CONFIG_FILE_READ",
            message: format!("failed to read config file at {}", path),
        })?;

        let env = std::env::vars().collect::<HashMap<_, _>>();
        Self::from_yaml_str(&contents, &env)
    }

    pub fn from_yaml_str(yaml: &str, env: &HashMap<String, String>) -> Result<Self, StartupError> {
        let raw: RawConfig = serde_yaml::from_str(yaml).map_err(|err| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config file: {}", err),
        })?;

        let bind_addr = parse_socket_addr(
            env.get("OPSGATE_BIND_ADDR")
                .map(|s| s.as_str())
                .or(raw.server.bind_addr.as_deref()),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9090),
        )?;

        let backend_timeout_ms = positive(
            raw.server.backend_timeout_ms.unwrap_or(10_000),
            "server.backend_timeout_ms",
        )?;
        let directory_timeout_ms = positive(
            raw.server.directory_timeout_ms.unwrap_or(5_000),
            "server.directory_timeout_ms",
        )?;
        let request_timeout_ms = positive(
            raw.server.request_timeout_ms.unwrap_or(30_000),
            "server.request_timeout_ms",
        )?;

        let fanout_concurrency = raw.server.fanout_concurrency.unwrap_or(8);
        if !(1..=MAX_FANOUT_CONCURRENCY).contains(&fanout_concurrency) {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!(
                    "server.fanout_concurrency must be between 1 and {}",
                    MAX_FANOUT_CONCURRENCY
                ),
            });
        }

        let default_target = raw
            .server
            .default_target
            .as_deref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("prod")
            .to_string();

        let token_secret = resolve_placeholders(&raw.auth.token_secret, env);
        if token_secret.trim().is_empty() {
            return Err(StartupError {
                code: "ERR_MISSING_CONFIG",
                message: "auth.token_secret must resolve to a non-empty value".to_string(),
            });
        }

        let ldap = parse_ldap(raw.ldap, env)?;

        let argocd = raw
            .argocd
            .into_iter()
            .map(|(name, target)| {
                let base_url = parse_target_url(&name, TargetKind::ArgoCd, &target.api_url)?;
                Ok(TargetConfig {
                    name: target_name(&name, TargetKind::ArgoCd)?,
                    kind: TargetKind::ArgoCd,
                    base_url,
                    credential: Credential::Basic {
                        username: target.username,
                        password: resolve_placeholders(&target.password, env),
                    },
                    insecure_skip_tls_verify: target.insecure_skip_tls_verify,
                })
            })
            .collect::<Result<Vec<_>, StartupError>>()?;

        let tekton = raw
            .tekton
            .into_iter()
            .map(|(name, target)| {
                let base_url = parse_target_url(&name, TargetKind::Tekton, &target.api_url)?;
                Ok(TargetConfig {
                    name: target_name(&name, TargetKind::Tekton)?,
                    kind: TargetKind::Tekton,
                    base_url,
                    credential: Credential::Token(resolve_placeholders(&target.token, env)),
                    insecure_skip_tls_verify: target.insecure_skip_tls_verify,
                })
            })
            .collect::<Result<Vec<_>, StartupError>>()?;

        let has_targets = !argocd.is_empty() || !tekton.is_empty();
        let default_known = argocd
            .iter()
            .chain(tekton.iter())
            .any(|t| t.name == default_target);
        if has_targets && !default_known {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!(
                    "server.default_target {} does not name a configured target",
                    default_target
                ),
            });
        }

        let allowed_origins = raw
            .frontend
            .allowed_origins
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_addr,
            backend_timeout_ms,
            directory_timeout_ms,
            request_timeout_ms,
            fanout_concurrency,
            default_target,
            token_secret,
            ldap,
            argocd,
            tekton,
            allowed_origins,
        })
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    /// Upper bound on a whole application listing, detail fan-out included.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Replaces every `${NAME}` with the value of `NAME` in `env`, or with the empty string
/// when the variable is not set.
pub fn resolve_placeholders(value: &str, env: &HashMap<String, String>) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let pattern = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("placeholder pattern"));

    pattern
        .replace_all(value, |caps: &Captures<'_>| {
            env.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

fn parse_ldap(raw: RawLdap, env: &HashMap<String, String>) -> Result<LdapSettings, StartupError> {
    let url = require_nonempty(raw.url, "ldap.url")?;
    if !url.starts_with("ldaps://") {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "ldap.url must use the ldaps:// scheme".to_string(),
        });
    }

    let base_dn = require_nonempty(raw.base_dn, "ldap.base_dn")?;
    let ca_cert_path = require_nonempty(raw.ca_cert_path, "ldap.ca_cert_path")?;
    let bind_dn = require_nonempty(raw.binduser, "ldap.binduser")?;

    let bind_password = Some(raw.binduser_password_env.trim())
        .filter(|name| !name.is_empty())
        .and_then(|name| env.get(name))
        .filter(|value| !value.is_empty())
        .cloned();

    let account_attribute = raw
        .account_attribute
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "sAMAccountName".to_string());

    let object_class = raw
        .object_class
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "user".to_string());

    Ok(LdapSettings {
        url,
        base_dn,
        ca_cert_path,
        bind_dn,
        bind_password,
        account_attribute,
        object_class,
    })
}

fn target_name(name: &str, kind: TargetKind) -> Result<String, StartupError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} target names must be non-empty", kind.as_str()),
        });
    }
    Ok(name.to_string())
}

fn parse_target_url(name: &str, kind: TargetKind, raw: &str) -> Result<Url, StartupError> {
    let key = format!("{}.{}.api_url", kind.as_str(), name);
    let raw = require_nonempty(raw.to_string(), &key)?;

    let url = Url::parse(&raw).map_err(|_| StartupError {
        code: "ERR_INVALID_CONFIG",
        message: format!("{} must be an absolute URL", key),
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an http(s) URL", key),
        });
    }

    Ok(url)
}

fn require_nonempty(value: String, key: &str) -> Result<String, StartupError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        });
    }
    Ok(value.to_string())
}

fn positive(value: u64, key: &'static str) -> Result<u64, StartupError> {
    if value == 0 {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be >= 1", key),
        });
    }
    Ok(value)
}

fn parse_socket_addr(value: Option<&str>, default: SocketAddr) -> Result<SocketAddr, StartupError> {
    match value.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "server.bind_addr must be a valid host:port socket address".to_string(),
        }),
    }
}
